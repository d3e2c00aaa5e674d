use std::env;
use std::path::PathBuf;

/// Environment variable naming a directory that receives a graphviz dump of
/// every lowered function.
pub const DUMP_CFG_VAR: &str = "STATEFUL_DUMP_CFG";

/// Environment variable that disables control-flow simplification when set
/// to anything other than `0`.
pub const SKIP_SIMPLIFY_VAR: &str = "STATEFUL_SKIP_SIMPLIFY";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub dump_cfg: Option<PathBuf>,
    pub simplify_cfg: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dump_cfg: None,
            simplify_cfg: true,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    pub fn from_env() -> Self {
        Config::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(dir) = lookup(DUMP_CFG_VAR).filter(|dir| !dir.is_empty()) {
            config.dump_cfg = Some(PathBuf::from(dir));
        }

        if let Some(value) = lookup(SKIP_SIMPLIFY_VAR) {
            config.simplify_cfg = value.is_empty() || value == "0";
        }

        config
    }

    pub fn dump_cfg(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_cfg = Some(dir.into());
        self
    }

    pub fn simplify_cfg(mut self, simplify: bool) -> Self {
        self.simplify_cfg = simplify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config, Config::default());
        assert!(config.simplify_cfg);
        assert!(config.dump_cfg.is_none());
    }

    #[test]
    fn test_lookup() {
        let config = Config::from_lookup(|name| match name {
            DUMP_CFG_VAR => Some("/tmp/cfg".to_string()),
            SKIP_SIMPLIFY_VAR => Some("1".to_string()),
            _ => None,
        });
        assert_eq!(config.dump_cfg, Some(PathBuf::from("/tmp/cfg")));
        assert!(!config.simplify_cfg);

        let config = Config::from_lookup(|name| match name {
            SKIP_SIMPLIFY_VAR => Some("0".to_string()),
            _ => None,
        });
        assert!(config.simplify_cfg);
    }
}
