use std::ops::Deref;
use std::sync::Arc;

use crate::errors::KvResult;

use super::StoreImage;

/// Backend that keeps store images between `save` and `reload`.
///
/// Writes must be atomic per store: after a failed `write_image` the
/// previous image, if any, is still readable.
pub trait SnapshotProvider: Send + Sync {
    fn write_image(&self, image: &StoreImage) -> KvResult<()>;

    /// The last image written for `name`, or `None` if there is none.
    fn read_image(&self, name: &str) -> KvResult<Option<StoreImage>>;

    fn has_image(&self, name: &str) -> KvResult<bool>;

    /// Removing an image that does not exist is not an error.
    fn remove_image(&self, name: &str) -> KvResult<()>;

    fn image_names(&self) -> KvResult<Vec<String>>;
}

/// Shared handle to a [`SnapshotProvider`]. Cloning is cheap.
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<dyn SnapshotProvider>,
}

impl SnapshotStore {
    pub fn new<T: SnapshotProvider + 'static>(inner: T) -> Self {
        SnapshotStore {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for SnapshotStore {
    type Target = Arc<dyn SnapshotProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
