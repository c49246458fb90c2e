pub mod auth;
pub mod codec;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod keyfile;
pub mod kv;
pub mod logging;
pub mod model;
pub mod repository;

pub use auth::{AuthProof, SignatureChallenge};
pub use codec::{InterestCodec, PlaceholderCodec, Transform};
pub use config::TwinvaultConfig;
pub use error::{TwinvaultError, TwinvaultResult};
pub use kv::{KvClient, Signer};
pub use model::{InterestCategory, InterestProfile, TwinRecord, TwinStatus};
pub use repository::TwinRepository;
