use shardkv::{KvError, KvResult, Registry, RegistryBuilder};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Duration;
use std::{env, fs, thread};

/// Runs `test` against a registry with default settings over a fresh image
/// backend. See [`run_test_with`].
pub fn run_test<T>(test: T)
where
    T: FnOnce(&mut TestContext) -> KvResult<()>,
{
    run_test_with(Registry::builder, test)
}

/// Opens a fresh image backend and a registry built by `builder` over it,
/// runs `test`, then closes whatever registry the context holds and removes
/// the backend's files. Cleanup happens whether the test returned an error
/// or panicked; the failure is reported afterwards.
pub fn run_test_with<B, T>(builder: B, test: T)
where
    B: Fn() -> RegistryBuilder,
    T: FnOnce(&mut TestContext) -> KvResult<()>,
{
    let mut ctx = match create_test_context_with(builder) {
        Ok(ctx) => ctx,
        Err(err) => panic!("Failed to open a registry for the test: {:?}", err),
    };
    let path = ctx.path.clone();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| test(&mut ctx)));
    if let Err(err) = cleanup(ctx) {
        eprintln!("Warning: Failed to clean up {}: {:?}", path, err);
    }

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => panic!("Test failed on registry at {}: {:?}", path, err),
        Err(payload) => panic::resume_unwind(payload),
    }
}

#[cfg(feature = "fjall")]
pub type TestProvider = shardkv_fjall_adapter::FjallSnapshotProvider;

#[cfg(all(feature = "memory", not(feature = "fjall")))]
pub type TestProvider = shardkv::InMemorySnapshotProvider;

#[cfg(not(any(feature = "fjall", feature = "memory")))]
pub type TestProvider = shardkv::FileSnapshotProvider;

#[cfg(feature = "fjall")]
fn open_provider(path: &str) -> KvResult<TestProvider> {
    shardkv_fjall_adapter::FjallSnapshotProvider::open(path)
}

#[cfg(all(feature = "memory", not(feature = "fjall")))]
fn open_provider(_path: &str) -> KvResult<TestProvider> {
    Ok(shardkv::InMemorySnapshotProvider::new())
}

#[cfg(not(any(feature = "fjall", feature = "memory")))]
fn open_provider(path: &str) -> KvResult<TestProvider> {
    shardkv::FileSnapshotProvider::new(path)
}

/// A registry over a fresh image backend, plus the backend itself so the
/// registry can be reopened over the same images.
#[derive(Clone)]
pub struct TestContext {
    path: String,
    provider: TestProvider,
    registry: Registry,
}

impl TestContext {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn provider(&self) -> TestProvider {
        self.provider.clone()
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Closes the registry and opens a fresh one over the same images.
    pub fn reopen(&mut self) -> KvResult<()> {
        self.reopen_with(Registry::builder())
    }

    pub fn reopen_with(&mut self, builder: RegistryBuilder) -> KvResult<()> {
        self.registry.close()?;
        self.registry = builder.snapshot_provider(self.provider.clone()).open()?;
        Ok(())
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    env::temp_dir()
        .join(format!("shardkv-{}", id))
        .to_string_lossy()
        .into_owned()
}

/// Builds the context from a fresh builder on every attempt.
fn create_test_context_with(builder: impl Fn() -> RegistryBuilder) -> KvResult<TestContext> {
    const MAX_ATTEMPTS: u32 = 3;
    let mut last_error: Option<KvError> = None;

    for attempt in 1..=MAX_ATTEMPTS {
        let path = random_path();
        if Path::new(&path).exists() {
            let _ = fs::remove_dir_all(&path);
        }

        let opened = open_provider(&path).and_then(|provider| {
            let registry = builder().snapshot_provider(provider.clone()).open()?;
            Ok(TestContext {
                path: path.clone(),
                provider,
                registry,
            })
        });
        match opened {
            Ok(ctx) => return Ok(ctx),
            Err(e) => {
                let _ = fs::remove_dir_all(&path);
                if attempt < MAX_ATTEMPTS {
                    eprintln!(
                        "Warning: Failed to create test context (attempt {}/{}): {:?}",
                        attempt, MAX_ATTEMPTS, e
                    );
                    thread::sleep(Duration::from_millis(50 * attempt as u64));
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| KvError::from("Failed to create test context")))
}

pub fn cleanup(ctx: TestContext) -> KvResult<()> {
    ctx.registry.close()?;
    if Path::new(&ctx.path).exists() {
        // fjall may still hold files open through other clones
        if let Err(e) = fs::remove_dir_all(&ctx.path) {
            eprintln!("Warning: Failed to remove {}: {}", ctx.path, e);
        }
    }
    Ok(())
}
