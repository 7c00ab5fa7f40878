pub mod acceptance;
pub mod customer;
pub mod item;
pub mod purchase_order;
pub mod quotation;

use uuid::Uuid;

/// Short prefixed identifier, e.g. `QI-3f9c1a2b7d4e`.
pub fn new_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &raw[..12])
}
