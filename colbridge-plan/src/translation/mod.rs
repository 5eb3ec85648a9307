pub mod filter;
pub mod projection;
pub mod types;

pub use filter::{ConversionReport, DropReason, DroppedConstraint, FilterConverter};
pub use projection::{Projection, resolve_projection};
pub use types::{
    FieldResolution, decode_field, decode_value, encode_value, logical_to_storage,
    promote_value, promotion_is_valid, resolve_field, storage_to_logical,
};
