use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ItemQuery {
    #[serde(default)]
    pub all_items: bool,
}
