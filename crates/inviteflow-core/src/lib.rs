pub mod child;
pub mod domain;
pub mod error;
pub mod filter;
pub mod id;
pub mod item;
pub mod readers;
pub mod record;
pub mod template;
pub mod time;

pub use child::{ChildObject, ChildSpec};
pub use domain::VenueDomain;
pub use error::{CoreError, ErrorCategory, Result};
pub use filter::SourceFilter;
pub use id::{INVITATION_SEPARATOR, child_invitation_id, invitation_name, invitation_prefix};
pub use item::{Content, ContentField, Item};
pub use readers::{EVERYONE, ReaderList, SELF_MARKER};
pub use record::{DependentRecord, ReaderSpec, RecordPolicy};
pub use template::{FieldKind, FieldTemplate, Template};
pub use time::{Timestamp, now};
