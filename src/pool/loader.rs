use crate::Error;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Source of encoded classes for a pool
///
/// Returning `Ok(None)` means this loader does not know the class; a chained loader (or the pool
/// itself) decides what happens next. Returning `Err` aborts the lookup.
pub trait ClassLoader {
    fn load(&self, class_name: &str) -> Result<Option<Vec<u8>>, Error>;
}

/// In-memory loader, chaining to an optional parent for classes it does not hold
#[derive(Default)]
pub struct MapLoader {
    classes: HashMap<String, Vec<u8>>,
    parent: Option<Box<dyn ClassLoader>>,
}

impl MapLoader {
    pub fn new() -> MapLoader {
        MapLoader::default()
    }

    pub fn with_parent(parent: Box<dyn ClassLoader>) -> MapLoader {
        MapLoader {
            classes: HashMap::new(),
            parent: Some(parent),
        }
    }

    pub fn add(&mut self, class_name: impl Into<String>, bytes: Vec<u8>) {
        self.classes.insert(class_name.into(), bytes);
    }
}

impl ClassLoader for MapLoader {
    fn load(&self, class_name: &str) -> Result<Option<Vec<u8>>, Error> {
        match self.classes.get(class_name) {
            Some(bytes) => Ok(Some(bytes.clone())),
            None => match &self.parent {
                Some(parent) => parent.load(class_name),
                None => Ok(None),
            },
        }
    }
}

/// Loader reading encoded classes from `<root>/<internal/class/Name>.plc`
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl AsRef<Path>) -> DirectoryLoader {
        DirectoryLoader {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ClassLoader for DirectoryLoader {
    fn load(&self, class_name: &str) -> Result<Option<Vec<u8>>, Error> {
        let path = self.root.join(format!("{}.plc", class_name));
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_loader_falls_back_to_its_parent() {
        let mut parent = MapLoader::new();
        parent.add("app/FromParent", vec![1, 2, 3]);

        let mut child = MapLoader::with_parent(Box::new(parent));
        child.add("app/FromChild", vec![4]);

        assert_eq!(child.load("app/FromChild").unwrap(), Some(vec![4]));
        assert_eq!(child.load("app/FromParent").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(child.load("app/Unknown").unwrap(), None);
    }
}
