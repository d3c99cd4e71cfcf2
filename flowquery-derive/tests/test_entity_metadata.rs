//! Metadata published by `#[derive(Entity)]`
//!
//! Tests cover table naming, column overrides, primary keys, transient fields
//! and the foreign key defaults of both relationship kinds.

use flowquery::{DataType, Entity, Relation, Typed};

#[derive(Entity)]
#[table_name = "accounts"]
pub struct Account {
    #[primary_key]
    pub id: i64,
    #[column_name = "display_name"]
    pub name: String,
    pub balance: Option<f64>,
    #[many_to_one]
    pub owner: Option<Owner>,
    #[many_to_one(column = "parent_account")]
    pub parent: Option<Box<Account>>,
    #[transient]
    pub cached_total: f64,
}

#[derive(Entity)]
pub struct Owner {
    #[primary_key]
    pub id: i64,
    #[one_to_many]
    pub accounts: Vec<Account>,
    #[one_to_many(key = "manager")]
    pub managed: Vec<Account>,
}

#[derive(Entity)]
pub struct LedgerEntry {
    pub id: i64,
}

#[test]
fn test_table_names() {
    assert_eq!(Account::meta().table, "accounts");
    assert_eq!(Account::meta().name, "Account");
    assert_eq!(Owner::meta().table, "owner");
    assert_eq!(LedgerEntry::meta().table, "ledger_entry");
}

#[test]
fn test_columns_and_primary_key() {
    let meta = Account::meta();
    assert_eq!(meta.property("id").unwrap().column, "id");
    assert_eq!(meta.property("name").unwrap().column, "display_name");
    assert_eq!(meta.primary_key().unwrap().name, "id");
    assert!(meta.property("cached_total").is_none());
    assert_eq!(meta.properties.len(), 5);

    assert_eq!(meta.property("name").unwrap().data_type(), DataType::String);
    assert_eq!(meta.property("balance").unwrap().data_type(), DataType::Double);

    assert!(LedgerEntry::meta().primary_key().is_none());
}

#[test]
fn test_many_to_one_columns() {
    let meta = Account::meta();

    let owner = meta.property("owner").unwrap();
    assert_eq!(owner.column, "owner_id");
    assert!(matches!(
        owner.relation,
        Some(Relation::ManyToOne { column: "owner_id", .. })
    ));
    assert_eq!(owner.relation.unwrap().target().table, "owner");

    let parent = meta.property("parent").unwrap();
    assert_eq!(parent.column, "parent_account");
    assert_eq!(parent.relation.unwrap().target().table, "accounts");
}

#[test]
fn test_one_to_many_keys() {
    let meta = Owner::meta();

    let accounts = meta.property("accounts").unwrap();
    assert!(matches!(
        accounts.relation,
        Some(Relation::OneToMany { key: "owner_id", .. })
    ));
    assert_eq!(accounts.relation.unwrap().target().table, "accounts");

    let managed = meta.property("managed").unwrap();
    assert!(matches!(
        managed.relation,
        Some(Relation::OneToMany { key: "manager", .. })
    ));
}

#[test]
fn test_entity_data_type() {
    match Account::data_type() {
        DataType::Entity(entity) => assert_eq!(entity.meta().table, "accounts"),
        other => panic!("expected an entity type, got {other:?}"),
    }
    assert!(matches!(
        Owner::meta().property("accounts").unwrap().data_type(),
        DataType::Collection(_)
    ));
}
