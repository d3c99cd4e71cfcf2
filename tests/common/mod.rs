//! Entity fixtures shared by the integration tests.
#![allow(dead_code)]

use flowquery::Entity;
use serde::Deserialize;

#[derive(Entity, Deserialize, Debug, Clone, PartialEq, Default)]
#[table_name = "users"]
pub struct User {
    #[primary_key]
    pub id: i64,
    #[column_name = "user_name"]
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub is_online: bool,
    #[many_to_one(column = "setting_id")]
    pub setting: Option<Setting>,
    #[one_to_many(key = "user_id")]
    #[serde(default)]
    pub groups: Vec<UserGroupLink>,
}

#[derive(Entity, Deserialize, Debug, Clone, PartialEq, Default)]
#[table_name = "settings"]
pub struct Setting {
    #[primary_key]
    pub id: i64,
    pub reference: String,
}

#[derive(Entity, Deserialize, Debug, Clone, PartialEq, Default)]
#[table_name = "user_groups"]
pub struct UserGroupLink {
    #[primary_key]
    pub id: i64,
    #[many_to_one(column = "user_id")]
    pub user: Option<Box<User>>,
    #[many_to_one(column = "group_id")]
    pub group: Option<Group>,
}

#[derive(Entity, Deserialize, Debug, Clone, PartialEq, Default)]
#[table_name = "groups"]
pub struct Group {
    #[primary_key]
    pub id: i64,
    pub name: String,
}
