//! Who is asking. Resolved once at the boundary and passed explicitly to
//! every call whose answer depends on it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { #[default] Customer, Admin }

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" | "user" => Ok(Self::Customer),
            "admin" => Ok(Self::Admin),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Requester { pub id: Uuid, pub role: Role }

impl Requester {
    pub fn customer(id: Uuid) -> Self { Self { id, role: Role::Customer } }
    pub fn admin(id: Uuid) -> Self { Self { id, role: Role::Admin } }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
    /// Owners see their own records; admins see everything.
    pub fn can_access(&self, owner: Uuid) -> bool { self.is_admin() || self.id == owner }
}
