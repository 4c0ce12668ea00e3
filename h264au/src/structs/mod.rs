//! Data structures representing H.264 Annex-B stream components.
//!
//! Contains NAL unit views, access units, slice headers, and the decoded frame
//! types exchanged with decoder backends.

pub mod access_unit;
pub mod frame;
pub mod nal;
pub mod packet;
pub mod slice;
pub mod timestamp;
