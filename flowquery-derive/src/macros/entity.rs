//! Derive macro for Entity
//!
//! Generates a lazily initialised `EntityMeta` describing the struct's table,
//! mapped properties and relationships, plus the matching `Typed` impl so the
//! struct can appear as a lambda parameter or a navigation target.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, GenericArgument, PathArguments, Type};

use crate::attributes::{self, RelationAttribute};
use crate::utils;

pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let entity_name = struct_name.to_string();
    let table_name = attributes::extract_table_name(&input.attrs)
        .unwrap_or_else(|| utils::snake_case(&entity_name));

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    struct_name,
                    "Entity can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "Entity can only be derived for structs",
            ))
        }
    };

    let mut properties = Vec::new();
    for field in fields {
        let attrs = attributes::parse_property_attributes(field)?;
        if attrs.is_transient {
            continue;
        }
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let name = ident.to_string();
        let ty = &field.ty;
        let primary_key = attrs.is_primary_key;

        let (column, relation) = match attrs.relation {
            None => {
                let column = attrs.column_name.unwrap_or_else(|| name.clone());
                (column, quote! { None })
            }
            Some(RelationAttribute::ManyToOne { column }) => {
                let column = column
                    .or(attrs.column_name)
                    .unwrap_or_else(|| format!("{name}_id"));
                let target = unwrap_type(ty, &["Option", "Box"]);
                (
                    column.clone(),
                    quote! {
                        Some(::flowquery::Relation::ManyToOne {
                            target: <#target as ::flowquery::Entity>::meta,
                            column: #column,
                        })
                    },
                )
            }
            Some(RelationAttribute::OneToMany { key }) => {
                let key = key.unwrap_or_else(|| format!("{}_id", utils::snake_case(&entity_name)));
                let target = unwrap_type(ty, &["Vec", "Option"]);
                (
                    String::new(),
                    quote! {
                        Some(::flowquery::Relation::OneToMany {
                            target: <#target as ::flowquery::Entity>::meta,
                            key: #key,
                        })
                    },
                )
            }
        };

        properties.push(quote! {
            ::flowquery::PropertyMeta {
                name: #name,
                column: #column,
                data_type: <#ty as ::flowquery::Typed>::data_type,
                relation: #relation,
                primary_key: #primary_key,
            }
        });
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::flowquery::Entity for #struct_name #ty_generics #where_clause {
            fn meta() -> &'static ::flowquery::EntityMeta {
                static META: ::std::sync::OnceLock<::flowquery::EntityMeta> =
                    ::std::sync::OnceLock::new();
                META.get_or_init(|| ::flowquery::EntityMeta {
                    name: #entity_name,
                    table: #table_name,
                    properties: vec![#(#properties),*],
                })
            }
        }

        impl #impl_generics ::flowquery::Typed for #struct_name #ty_generics #where_clause {
            fn data_type() -> ::flowquery::DataType {
                ::flowquery::DataType::Entity(::flowquery::EntityRef::new(
                    <Self as ::flowquery::Entity>::meta(),
                ))
            }
        }
    })
}

/// Peels the listed wrapper types (`Option<T>`, `Vec<T>`, ...) off a field type.
fn unwrap_type<'a>(ty: &'a Type, wrappers: &[&str]) -> &'a Type {
    if let Type::Path(path) = ty {
        if let Some(segment) = path.path.segments.last() {
            if wrappers.iter().any(|w| segment.ident == w) {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return unwrap_type(inner, wrappers);
                    }
                }
            }
        }
    }
    ty
}
