use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Employee identifier as it appears in the supervisor approval list.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct EmployeeId(pub String);

/// Opaque key of one pending leave entry awaiting supervisor approval.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct ApprovalKey(pub String);

/// Signed fragment (`AUTH|…`) returned by the second-factor provider on approval.
///
/// Combined with the relying-party id to form the `sig_response` the
/// federation hand-back expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct AuthSignature(pub String);
