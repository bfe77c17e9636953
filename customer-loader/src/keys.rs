use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum_macros::{AsRefStr, Display, EnumString};

/// The kinds of record the loader caches. The lowercase name is the key prefix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Customer,
    Vehicles,
    WorkOrders,
}

impl ResourceKind {
    /// Key for the record(s) of this kind belonging to `id`, e.g. `customer_42`
    pub fn key(&self, id: u64) -> String {
        format!("{}_{}", self, id)
    }

    /// Key for a filtered query on this kind for `id`.
    ///
    /// Parameters are hashed so that any filter combination yields a key of
    /// bounded length. Keys start with `"{kind}_{id}_"`, see [`Self::query_prefix`].
    pub fn query_key(&self, id: u64, params: &[(&str, &str)]) -> String {
        let mut params: Vec<_> = params.to_vec();
        params.sort();

        let mut hasher = Sha256::new();
        for (name, value) in params {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"&");
        }

        format!("{}{}", self.query_prefix(id), hex::encode(hasher.finalize()))
    }

    /// Prefix shared by every [`Self::query_key`] for `id`
    pub fn query_prefix(&self, id: u64) -> String {
        format!("{}_{}_", self, id)
    }

    /// Whether `key` is this kind's plain or filtered key for `id`
    pub fn owns_key(&self, id: u64, key: &str) -> bool {
        key == self.key(id) || key.starts_with(&self.query_prefix(id))
    }
}
