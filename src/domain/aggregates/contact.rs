//! Shipping contacts

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub id: i64,
    pub city: String,
    pub street: String,
    pub house: String,
    pub structure: String,
    pub building: String,
    pub apartment: String,
    pub phone: String,
}

/// Fields of a new contact. City, street and phone are required.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ContactFields {
    #[validate(length(min = 1, max = 60))]
    pub city: String,
    #[validate(length(min = 1, max = 60))]
    pub street: String,
    #[serde(default)]
    #[validate(length(max = 15))]
    pub house: String,
    #[serde(default)]
    #[validate(length(max = 15))]
    pub structure: String,
    #[serde(default)]
    #[validate(length(max = 15))]
    pub building: String,
    #[serde(default)]
    #[validate(length(max = 15))]
    pub apartment: String,
    #[validate(length(min = 1, max = 25))]
    pub phone: String,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ContactPatch {
    #[validate(length(min = 1, max = 60))]
    pub city: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub street: Option<String>,
    #[validate(length(max = 15))]
    pub house: Option<String>,
    #[validate(length(max = 15))]
    pub structure: Option<String>,
    #[validate(length(max = 15))]
    pub building: Option<String>,
    #[validate(length(max = 15))]
    pub apartment: Option<String>,
    #[validate(length(min = 1, max = 25))]
    pub phone: Option<String>,
}

impl Contact {
    pub fn from_fields(id: i64, f: ContactFields) -> Self {
        Self { id, city: f.city, street: f.street, house: f.house, structure: f.structure, building: f.building, apartment: f.apartment, phone: f.phone }
    }

    pub fn apply(&mut self, patch: ContactPatch) {
        if let Some(v) = patch.city { self.city = v; }
        if let Some(v) = patch.street { self.street = v; }
        if let Some(v) = patch.house { self.house = v; }
        if let Some(v) = patch.structure { self.structure = v; }
        if let Some(v) = patch.building { self.building = v; }
        if let Some(v) = patch.apartment { self.apartment = v; }
        if let Some(v) = patch.phone { self.phone = v; }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> ContactFields {
        ContactFields { city: "Moscow".into(), street: "Tverskaya".into(), house: "1".into(), phone: "+79990001122".into(), ..Default::default() }
    }

    #[test]
    fn test_required_fields() {
        assert!(fields().validate().is_ok());
        let missing_city = ContactFields { city: String::new(), ..fields() };
        assert!(missing_city.validate().is_err());
        let long_house = ContactFields { house: "x".repeat(16), ..fields() };
        assert!(long_house.validate().is_err());
    }

    #[test]
    fn test_patch_keeps_untouched_fields() {
        let mut contact = Contact::from_fields(3, fields());
        contact.apply(ContactPatch { street: Some("Arbat".into()), apartment: Some("12".into()), ..Default::default() });
        assert_eq!(contact.street, "Arbat");
        assert_eq!(contact.apartment, "12");
        assert_eq!(contact.city, "Moscow");
    }
}
