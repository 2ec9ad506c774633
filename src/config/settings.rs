use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:5001";
static DEFAULT_WALLET_FILE: &str = "wallet.dat";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const WALLET_FILE_KEY: &str = "WALLET_FILE";

/// Node settings, seeded from the environment and overridable at runtime.
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut map = HashMap::new();
        map.insert(
            String::from(NODE_ADDRESS_KEY),
            env::var(NODE_ADDRESS_KEY).unwrap_or_else(|_| String::from(DEFAULT_NODE_ADDR)),
        );
        map.insert(
            String::from(WALLET_FILE_KEY),
            env::var(WALLET_FILE_KEY).unwrap_or_else(|_| String::from(DEFAULT_WALLET_FILE)),
        );

        Config {
            inner: RwLock::new(map),
        }
    }

    pub fn get_node_addr(&self) -> String {
        let inner = self.inner.read().expect("config lock poisoned");
        inner
            .get(NODE_ADDRESS_KEY)
            .expect("node address is always present")
            .clone()
    }

    pub fn set_node_addr(&self, addr: String) {
        let mut inner = self.inner.write().expect("config lock poisoned");
        inner.insert(String::from(NODE_ADDRESS_KEY), addr);
    }

    /// Fixed location of the private-key credential.
    pub fn get_wallet_file(&self) -> PathBuf {
        let inner = self.inner.read().expect("config lock poisoned");
        PathBuf::from(
            inner
                .get(WALLET_FILE_KEY)
                .expect("wallet file is always present"),
        )
    }

    pub fn set_wallet_file(&self, path: String) {
        let mut inner = self.inner.write().expect("config lock poisoned");
        inner.insert(String::from(WALLET_FILE_KEY), path);
    }
}
