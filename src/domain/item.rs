use serde::{Deserialize, Serialize};

const MAX_TITLE_CHARS: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreate {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn validate_title(title: &str) -> Result<(), String> {
    let len = title.chars().count();
    if len == 0 || len > MAX_TITLE_CHARS {
        return Err(format!("Title must be between 1 and {MAX_TITLE_CHARS} characters"));
    }
    Ok(())
}

impl ItemCreate {
    /// # Errors
    /// Returns a message describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        validate_title(&self.title)
    }
}

impl ItemUpdate {
    /// # Errors
    /// Returns a message describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        self.title.as_deref().map_or(Ok(()), validate_title)
    }
}
