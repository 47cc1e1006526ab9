pub mod account;
pub mod approval;
pub mod circuit;
pub mod common;
pub mod document;
pub mod ligne;
pub mod registration;
pub mod sub_type;

pub use account::{AccountType, GeneralAccount, GeneralAccountRequest};
pub use approval::{ApprovalGroup, ApprovalGroupRequest, RuleType, User, MIN_APPROVERS};
pub use circuit::{Circuit, CircuitRequest};
pub use common::{to_option, to_options, Displayable, EntityId, Identifiable, NamedEntity};
pub use document::DocumentType;
pub use ligne::{Discount, Element, ElementType, Ligne, LigneRequest, LineTotals, Location};
pub use registration::{RegisteredUser, RegistrationRequest, UserType};
pub use sub_type::{OverlapCheck, SubType, SubTypeRequest};
