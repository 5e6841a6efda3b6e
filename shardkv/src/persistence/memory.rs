use std::collections::HashMap;

use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor};
use crate::errors::KvResult;

use super::{SnapshotProvider, StoreImage};

/// Keeps images in process memory. They survive `reload` and store removal
/// but not the process; this is the default provider of a registry.
#[derive(Clone, Default)]
pub struct InMemorySnapshotProvider {
    images: Atomic<HashMap<String, StoreImage>>,
}

impl InMemorySnapshotProvider {
    pub fn new() -> Self {
        InMemorySnapshotProvider {
            images: atomic(HashMap::new()),
        }
    }
}

impl SnapshotProvider for InMemorySnapshotProvider {
    fn write_image(&self, image: &StoreImage) -> KvResult<()> {
        self.images
            .write_with(|images| images.insert(image.name().to_string(), image.clone()));
        Ok(())
    }

    fn read_image(&self, name: &str) -> KvResult<Option<StoreImage>> {
        Ok(self.images.read_with(|images| images.get(name).cloned()))
    }

    fn has_image(&self, name: &str) -> KvResult<bool> {
        Ok(self.images.read_with(|images| images.contains_key(name)))
    }

    fn remove_image(&self, name: &str) -> KvResult<()> {
        self.images.write_with(|images| images.remove(name));
        Ok(())
    }

    fn image_names(&self) -> KvResult<Vec<String>> {
        let mut names: Vec<String> = self.images.read_with(|images| images.keys().cloned().collect());
        names.sort();
        Ok(names)
    }
}
