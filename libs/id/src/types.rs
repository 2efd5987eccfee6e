//! Typed ID definitions for registry resources.
//!
//! Each ID type has a unique prefix that identifies the resource type.
//! IDs are ULID-based for sortability and uniqueness.

use crate::define_id;

define_id!(RegistrationId, "reg");
define_id!(RequestId, "req");
