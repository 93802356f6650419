use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload kind carried by one buffer of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    String,
    #[serde(rename = "bytearray")]
    ByteArray,
    Int,
}

impl ItemType {
    pub const ALL: [ItemType; 3] = [ItemType::String, ItemType::ByteArray, ItemType::Int];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::String => "string",
            ItemType::ByteArray => "bytearray",
            ItemType::Int => "int",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_names_match_wire_keys() {
        for item_type in ItemType::ALL {
            let json = serde_json::to_string(&item_type).unwrap();
            assert_eq!(json, format!("\"{}\"", item_type.as_str()));
        }
    }
}
