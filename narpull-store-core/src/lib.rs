pub mod base32;
pub mod fingerprint;
pub mod narinfo;
pub mod signature;
pub mod store_path;

pub use fingerprint::{fingerprint, CANONICAL_STORE_DIR};
pub use narinfo::{Compression, NarInfo, NarInfoError};
pub use signature::{NarSignature, PublicKey, Signature, SignatureError, TrustedKeys};
pub use store_path::{StoreBase, StorePathError};
