pub mod blob;
pub mod operation;

pub use blob::{blob_field_for, decode_blob_value, is_empty_blob_value, BlobData};
pub use operation::ChangeOperation;
