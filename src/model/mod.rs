pub mod feature;
pub mod issuer;
pub mod price;
pub mod record;
