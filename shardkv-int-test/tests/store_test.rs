use std::thread;
use std::time::Duration;

use shardkv::{StoreConfig, Ttl};
use shardkv_int_test::test_util::run_test;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_hundred_thousand_ordered_keys() {
    run_test(|ctx| {
        let store = ctx
            .registry()
            .open_with("test", StoreConfig::new(true, 1)?)?;
        for i in 0..100_000 {
            let key = i.to_string();
            store.put(&key, format!("D{key}"))?;
        }

        assert_eq!(store.min()?, Some(b"0".to_vec()));
        assert_eq!(store.max()?, Some(b"99999".to_vec()));
        assert_eq!(store.size()?, 100_000);
        assert_eq!(store.get("100")?, Some(b"D100".to_vec()));
        // "1" plus every key starting with 1 and up to four more digits
        assert_eq!(store.count("1", "1~")?, 11_111);
        assert_eq!(store.count("5", "4")?, 0);
        Ok(())
    })
}

#[test]
fn test_last_write_wins_across_shards() {
    run_test(|ctx| {
        let store = ctx
            .registry()
            .open_with("overwrites", StoreConfig::new(true, 8)?)?;
        for round in 0..5 {
            for i in 0..500 {
                store.put(format!("k{i:03}"), format!("r{round}"))?;
            }
        }
        assert_eq!(store.size()?, 500);
        for i in 0..500 {
            assert_eq!(store.get(format!("k{i:03}"))?, Some(b"r4".to_vec()));
        }

        assert!(store.remove("k000")?);
        assert!(!store.remove("k000")?);
        assert_eq!(store.get("k000")?, None);
        assert_eq!(store.size()?, 499);
        Ok(())
    })
}

#[test]
fn test_bounds_and_counts_match_contents() {
    run_test(|ctx| {
        let registry = ctx.registry();
        for (name, ordered, shards) in [("ord", true, 4), ("hashed", false, 4)] {
            let store = registry.open_with(name, StoreConfig::new(ordered, shards)?)?;
            let mut keys: Vec<Vec<u8>> = (0..2000u32)
                .map(|i| (i.wrapping_mul(2_654_435_761) % 100_000).to_string().into_bytes())
                .collect();
            for key in &keys {
                store.put(key, b"v")?;
            }
            keys.sort();
            keys.dedup();

            let min = store.min()?.expect("store has keys");
            let max = store.max()?.expect("store has keys");
            assert_eq!(&min, keys.first().unwrap());
            assert_eq!(&max, keys.last().unwrap());
            assert!(keys.iter().all(|key| &min <= key && key <= &max));

            assert_eq!(store.count(&min, &max)?, store.size()?);
            for (low, high) in [("1", "2"), ("3", "35"), ("70000", "9"), ("", "0")] {
                let expected = keys
                    .iter()
                    .filter(|key| low.as_bytes() <= key.as_slice() && key.as_slice() <= high.as_bytes())
                    .count();
                assert_eq!(store.count(low, high)?, expected, "{name} [{low}, {high}]");
            }

            let iterated: Vec<Vec<u8>> = store.iter()?.map(|(key, _)| key).collect();
            assert_eq!(iterated, keys);
        }
        Ok(())
    })
}

#[test]
fn test_range_and_lower_bound() {
    run_test(|ctx| {
        let store = ctx
            .registry()
            .open_with("words", StoreConfig::new(true, 3)?)?;
        for word in ["apple", "apricot", "banana", "blueberry", "cherry"] {
            store.put(word, word.len().to_string())?;
        }

        let found: Vec<Vec<u8>> = store.range("ap", "b~")?.map(|(key, _)| key).collect();
        assert_eq!(
            found,
            vec![
                b"apple".to_vec(),
                b"apricot".to_vec(),
                b"banana".to_vec(),
                b"blueberry".to_vec()
            ]
        );
        assert_eq!(store.range("z", "a")?.count(), 0);

        assert_eq!(
            store.lower_bound("b")?,
            Some((b"banana".to_vec(), b"6".to_vec()))
        );
        assert_eq!(store.lower_bound("cherry")?.map(|(key, _)| key), Some(b"cherry".to_vec()));
        assert_eq!(store.lower_bound("d")?, None);
        Ok(())
    })
}

#[test]
fn test_clear_empties_store() {
    run_test(|ctx| {
        let registry = ctx.registry();
        let store = registry.open("scratch")?;
        for i in 0..10_000 {
            store.put(format!("key-{i}"), vec![7u8; 64])?;
        }
        let before = registry.stats()?;
        assert!(before.logical_allocated > 0);

        store.clear()?;
        assert_eq!(store.size()?, 0);
        assert_eq!(store.min()?, None);
        assert_eq!(store.max()?, None);
        assert_eq!(store.count("", "~")?, 0);
        assert!(registry.stats()?.logical_allocated < before.logical_allocated);

        store.put("again", "yes")?;
        assert_eq!(store.get("again")?, Some(b"yes".to_vec()));
        Ok(())
    })
}

#[test]
fn test_counters() {
    run_test(|ctx| {
        let store = ctx.registry().open("counters")?;
        assert_eq!(store.incr("hits", 1.0)?, 1.0);
        assert_eq!(store.incr("hits", 2.5)?, 3.5);
        assert_eq!(store.decr("hits", 0.5)?, 3.0);
        assert_eq!(store.get("hits")?, Some(b"3".to_vec()));

        store.put("name", "not a number")?;
        assert!(store.incr("name", 1.0).is_err());
        assert_eq!(store.get("name")?, Some(b"not a number".to_vec()));
        Ok(())
    })
}

#[test]
fn test_batches_and_conditional_inserts() {
    run_test(|ctx| {
        let store = ctx
            .registry()
            .open_with("batches", StoreConfig::new(true, 5)?)?;
        store.put_many((0..2000).map(|i| (format!("b{i:04}"), format!("v{i}"))))?;
        assert_eq!(store.size()?, 2000);

        let values = store.get_many(["b0007", "missing", "b1999", "b0007"])?;
        assert_eq!(
            values,
            vec![
                Some(b"v7".to_vec()),
                None,
                Some(b"v1999".to_vec()),
                Some(b"v7".to_vec()),
            ]
        );

        assert!(!store.add("b0007", "other")?);
        assert_eq!(store.get("b0007")?, Some(b"v7".to_vec()));
        assert!(store.add("b2000", "v2000")?);
        assert_eq!(store.size()?, 2001);
        assert_eq!(store.max()?, Some(b"b2000".to_vec()));
        Ok(())
    })
}

#[test]
fn test_expiring_keys() {
    run_test(|ctx| {
        let store = ctx
            .registry()
            .open_with("sessions", StoreConfig::new(true, 3)?)?;
        for i in 0..100 {
            store.put(format!("s{i:03}"), "token")?;
        }
        for i in (0..100).step_by(2) {
            assert!(store.expire(format!("s{i:03}"), Duration::from_millis(50))?);
        }
        assert!(!store.expire("absent", Duration::from_secs(1))?);
        assert_eq!(store.ttl("s001")?, Ttl::Persistent);
        assert_eq!(store.ttl("absent")?, Ttl::Missing);
        match store.ttl("s000")? {
            Ttl::Remaining(left) => assert!(left <= Duration::from_millis(50)),
            other => panic!("unexpected ttl {:?}", other),
        }

        thread::sleep(Duration::from_millis(120));
        assert_eq!(store.get("s000")?, None);
        assert_eq!(store.ttl("s000")?, Ttl::Missing);
        assert_eq!(store.get("s001")?, Some(b"token".to_vec()));
        // expired keys can be claimed again
        assert!(store.add("s002", "fresh")?);
        assert_eq!(store.ttl("s002")?, Ttl::Persistent);

        assert_eq!(store.purge_expired()?, 49);
        assert_eq!(store.size()?, 51);
        let live: Vec<Vec<u8>> = store.iter()?.map(|(key, _)| key).collect();
        assert_eq!(live.len(), 51);
        assert!(live.contains(&b"s002".to_vec()));
        Ok(())
    })
}
