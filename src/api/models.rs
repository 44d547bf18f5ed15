//! Wire models for the demo member endpoint

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub member_id: String,
    pub name: String,
}

impl MemberDto {
    pub fn greeting(id: &str) -> Self {
        Self {
            member_id: id.to_string(),
            name: format!("hello {id}"),
        }
    }
}
