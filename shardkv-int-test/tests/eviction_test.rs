use shardkv::{EvictionPolicy, Registry, StoreConfig};
use shardkv_int_test::test_util::run_test_with;

#[ctor::ctor]
fn init() {
    colog::init();
}

const CEILING: u64 = 256 * 1024;

fn bounded() -> shardkv::RegistryBuilder {
    Registry::builder().max_memory_bytes(CEILING)
}

#[test]
fn test_memory_stays_under_ceiling() {
    run_test_with(bounded, |ctx| {
        let registry = ctx.registry();
        let cache = registry.open_with("cache", StoreConfig::new(true, 4)?)?;
        cache.set_lru("ON")?;

        let mut last_evicted = 0;
        for i in 0..20_000 {
            cache.put(format!("key-{i:06}"), [b'v'; 48])?;
            let stats = registry.stats()?;
            assert!(
                stats.logical_allocated <= CEILING,
                "{} bytes after put {}",
                stats.logical_allocated,
                i
            );
            assert!(stats.keys_evicted >= last_evicted);
            last_evicted = stats.keys_evicted;
        }

        assert!(last_evicted > 0);
        assert_eq!(cache.size()? as u64 + last_evicted, 20_000);
        // the newest keys are the ones left
        assert_eq!(cache.get("key-019999")?, Some(vec![b'v'; 48]));
        assert_eq!(cache.get("key-000000")?, None);
        assert_eq!(cache.max()?, Some(b"key-019999".to_vec()));
        Ok(())
    })
}

#[test]
fn test_reads_keep_keys_alive() {
    run_test_with(bounded, |ctx| {
        let cache = ctx
            .registry()
            .open_with("sessions", StoreConfig::new(true, 4)?)?;
        cache.set_lru("ON")?;
        cache.put("hot", "still here")?;
        cache.put("cold", "gone soon")?;

        for i in 0..20_000 {
            cache.put(format!("filler-{i:06}"), [b'f'; 48])?;
            if i % 100 == 0 {
                assert_eq!(cache.get("hot")?, Some(b"still here".to_vec()));
            }
        }
        assert_eq!(cache.get("hot")?, Some(b"still here".to_vec()));
        assert_eq!(cache.get("cold")?, None);
        Ok(())
    })
}

#[test]
fn test_store_lru_spares_other_stores() {
    run_test_with(bounded, |ctx| {
        let registry = ctx.registry();
        let durable = registry.open("durable")?;
        for i in 0..500 {
            durable.put(format!("d{i:04}"), [b'd'; 48])?;
        }
        let cache = registry.open("cache")?;
        cache.set_lru("ON")?;
        for i in 0..20_000 {
            cache.put(format!("c{i:06}"), [b'c'; 48])?;
        }

        assert!(registry.stats()?.keys_evicted > 0);
        assert_eq!(durable.size()?, 500);
        assert!(cache.size()? < 20_000);
        Ok(())
    })
}

#[test]
fn test_allkeys_lru_evicts_everywhere() {
    run_test_with(|| bounded().eviction_policy(EvictionPolicy::AllKeysLru), |ctx| {
        let registry = ctx.registry();
        let old = registry.open("old")?;
        for i in 0..1000 {
            old.put(format!("o{i:04}"), [b'o'; 48])?;
        }
        let new = registry.open("new")?;
        for i in 0..20_000 {
            new.put(format!("n{i:06}"), [b'n'; 48])?;
        }

        assert!(old.size()? < 1000);
        assert!(registry.stats()?.logical_allocated <= CEILING);
        // the configuration store is never evicted from
        assert_eq!(
            registry.global_config()?.eviction_policy(),
            EvictionPolicy::AllKeysLru
        );
        Ok(())
    })
}

#[test]
fn test_disabling_eviction() {
    run_test_with(bounded, |ctx| {
        let registry = ctx.registry();
        let cache = registry.open("cache")?;
        cache.set_lru("ON")?;
        for i in 0..10_000 {
            cache.put(format!("a{i:05}"), [b'a'; 48])?;
        }
        let evicted = registry.stats()?.keys_evicted;
        assert!(evicted > 0);

        registry.set_global_config("max_memory_bytes", "0")?;
        let size = cache.size()?;
        for i in 0..10_000 {
            cache.put(format!("b{i:05}"), [b'b'; 48])?;
        }
        let stats = registry.stats()?;
        assert_eq!(stats.keys_evicted, evicted);
        assert_eq!(cache.size()?, size + 10_000);
        assert!(stats.logical_allocated > CEILING);
        Ok(())
    })
}

#[test]
fn test_noeviction_policy_allows_growth() {
    run_test_with(|| bounded().eviction_policy(EvictionPolicy::NoEviction), |ctx| {
        let registry = ctx.registry();
        let cache = registry.open("cache")?;
        cache.set_lru("ON")?;
        for i in 0..10_000 {
            cache.put(format!("k{i:05}"), [b'k'; 48])?;
        }
        assert_eq!(cache.size()?, 10_000);
        assert_eq!(registry.stats()?.keys_evicted, 0);
        Ok(())
    })
}
