/// Pool-wide behavior switches, fixed at pool construction
#[derive(Clone, Debug)]
pub struct PoolSettings {
    /// When a conduit intercepts a field write, also store the value into the real field
    ///
    /// Reads still go through the conduit; the shadow copy exists for callers that inspect
    /// instances from outside generated code.
    pub write_behind: bool,

    /// Package prefixes (internal form, e.g. `app/entities/`) whose classes the pool transforms
    ///
    /// Classes outside every controlled package are decoded and linked as-is.
    pub controlled_packages: Vec<String>,
}

impl Default for PoolSettings {
    fn default() -> PoolSettings {
        PoolSettings {
            write_behind: false,
            controlled_packages: vec![],
        }
    }
}

impl PoolSettings {
    pub fn controls(&self, class_name: &str) -> bool {
        self.controlled_packages
            .iter()
            .any(|prefix| class_name.starts_with(prefix.as_str()))
    }
}
