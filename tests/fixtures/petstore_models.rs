use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pet in the store
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub id: Uuid,
    pub name: String,
    /// Day the pet was born, if known
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub kind: PetKind,
    #[serde(skip)]
    pub internal_notes: String,
}

/// What sort of animal a pet is
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PetKind {
    Dog { good_boy: bool },
    Cat { lives: u8 },
    Fish,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PetPath {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewPet {
    pub name: String,
    pub kind: PetKind,
}

/// Error body returned by every failing request
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}
