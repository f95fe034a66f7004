/// In-memory storage never actually fails; this type exists so [`crate::MapStorage`] has a
/// concrete, inhabited-but-unconstructible `Error` to hang off [`crate::KvStore`].
#[derive(Debug, thiserror::Error)]
pub enum MapStorageError {}
