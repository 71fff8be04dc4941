// Models module - card, merchant, token and provisioning wire types

pub mod card;
pub mod merchant;
pub mod provisioning;
pub mod serde_helpers;
pub mod token;

pub use card::{CardProfile, Transaction, TransactionPage};
pub use merchant::{MerchantApp, MerchantAppId};
pub use provisioning::{ProvisioningRequest, ProvisioningResult, ProvisioningStatus, ResultStatus};
pub use token::{TokenDetails, TokenRecord, TokenStatus};
