// 📋 Container Contents - Current cargo manifest
//
// At most one record per container; recording new contents replaces the old one.

use serde::{Deserialize, Serialize};

/// Input for `record_contents`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContents {
    pub description: String,
    pub hazardous: bool,
    /// Cargo weight in kg, must not exceed the container's capacity
    pub weight: u64,
    /// Declared value, currency-agnostic
    pub value: u64,
    pub origin_country: String,
    pub destination_country: String,
    pub shipping_date: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerContents {
    pub container_id: u64,
    pub description: String,
    pub hazardous: bool,
    pub weight: u64,
    pub value: u64,
    pub origin_country: String,
    pub destination_country: String,
    pub shipping_date: u64,
}

impl ContainerContents {
    pub fn new(container_id: u64, input: NewContents) -> Self {
        ContainerContents {
            container_id,
            description: input.description,
            hazardous: input.hazardous,
            weight: input.weight,
            value: input.value,
            origin_country: input.origin_country,
            destination_country: input.destination_country,
            shipping_date: input.shipping_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contents_from_input() {
        let contents = ContainerContents::new(
            7,
            NewContents {
                description: "Electronics and computer parts".to_string(),
                hazardous: false,
                weight: 15000,
                value: 500000,
                origin_country: "China".to_string(),
                destination_country: "United States".to_string(),
                shipping_date: 100200,
            },
        );

        assert_eq!(contents.container_id, 7);
        assert_eq!(contents.weight, 15000);
        assert_eq!(contents.destination_country, "United States");
    }
}
