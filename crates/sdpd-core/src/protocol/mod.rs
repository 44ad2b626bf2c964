//! Wire protocol module
//!
//! - `data_element`: data element descriptors and sequence inspection
//! - `pdu`: request envelope parsing and response framing
//! - `request`: parameter parsing for the three request kinds

pub mod data_element;
pub mod pdu;
pub mod request;

pub use data_element::{DescriptorType, ElementHeader};
pub use pdu::{error_response, PduId, RequestEnvelope, ResponseWriter, CONTINUATION_LEN};
pub use request::{
    AttributeRange, AttributeRangeList, AttributeRequest, Continuation, SearchAttributeRequest,
    SearchRequest, UuidMatchSet,
};
