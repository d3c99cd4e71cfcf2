//! Attribute parsing utilities

use syn::{Attribute, ExprLit, Field, Lit, LitStr};

/// Extract table name from struct attributes
pub fn extract_table_name(attrs: &[Attribute]) -> Option<String> {
    extract_str(attrs, "table_name")
}

fn extract_str(attrs: &[Attribute], name: &str) -> Option<String> {
    for attr in attrs {
        if attr.path().is_ident(name) {
            if let Ok(meta) = attr.meta.require_name_value() {
                if let syn::Expr::Lit(ExprLit {
                    lit: Lit::Str(s),
                    ..
                }) = &meta.value {
                    return Some(s.value());
                }
            }
        }
    }
    None
}

/// Relationship declared on a field
pub enum RelationAttribute {
    /// `#[many_to_one]` or `#[many_to_one(column = "fk")]`
    ManyToOne { column: Option<String> },
    /// `#[one_to_many]` or `#[one_to_many(key = "fk")]`
    OneToMany { key: Option<String> },
}

/// Everything the `Entity` derive reads off a field
#[derive(Default)]
pub struct PropertyAttributes {
    pub is_primary_key: bool,
    pub is_transient: bool,
    pub column_name: Option<String>,
    pub relation: Option<RelationAttribute>,
}

/// Parse all property attributes from a field
pub fn parse_property_attributes(field: &Field) -> syn::Result<PropertyAttributes> {
    let mut attrs = PropertyAttributes::default();
    attrs.column_name = extract_str(&field.attrs, "column_name");

    for attr in &field.attrs {
        if attr.path().is_ident("primary_key") {
            attrs.is_primary_key = true;
        } else if attr.path().is_ident("transient") {
            attrs.is_transient = true;
        } else if attr.path().is_ident("many_to_one") {
            let column = parse_optional_key(attr, "column")?;
            attrs.relation = Some(RelationAttribute::ManyToOne { column });
        } else if attr.path().is_ident("one_to_many") {
            let key = parse_optional_key(attr, "key")?;
            attrs.relation = Some(RelationAttribute::OneToMany { key });
        }
    }

    Ok(attrs)
}

/// Reads `name = "..."` out of a list attribute; a bare path attribute yields `None`.
fn parse_optional_key(attr: &Attribute, key: &str) -> syn::Result<Option<String>> {
    if matches!(attr.meta, syn::Meta::Path(_)) {
        return Ok(None);
    }
    let mut value = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident(key) {
            let lit: LitStr = meta.value()?.parse()?;
            value = Some(lit.value());
            Ok(())
        } else {
            Err(meta.error(format!("unsupported relation attribute, expected `{key}`")))
        }
    })?;
    Ok(value)
}
