//! Procedural macros for the docbind project.
//!
//! `#[derive(Entity)]` implements `docbind::entity::Entity` for a struct:
//!
//! ```ignore
//! use docbind::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
//! #[entity(name = "Orders")]
//! pub struct Order {
//!     #[entity(required)]
//!     pub status: String,
//!     #[entity(reference = "Customers")]
//!     pub customer: ObjectId,
//!     #[entity(references = "Items")]
//!     pub items: Vec<ObjectId>,
//! }
//! ```
//!
//! Container attributes:
//! - `name = "..."` sets the entity name; defaults to the type name.
//! - `base = "..."` makes the entity a discriminator of another entity.
//!
//! Field attributes:
//! - `required` declares the field required in the bound schema.
//! - `reference = "..."` declares a single-id reference to an entity.
//! - `references = "..."` declares an array-of-ids reference to an entity.
//! - `rename = "..."` sets the stored field name; defaults to the field name.

#[allow(unused_extern_crates)]
extern crate self as docbind_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input, spanned::Spanned};

#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_entity(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Default)]
struct ContainerAttrs {
    name: Option<LitStr>,
    base: Option<LitStr>,
}

enum Reference {
    Single(LitStr),
    Many(LitStr),
}

#[derive(Default)]
struct FieldAttrs {
    rename: Option<LitStr>,
    required: bool,
    reference: Option<Reference>,
}

fn container_attrs(input: &DeriveInput) -> syn::Result<ContainerAttrs> {
    let mut attrs = ContainerAttrs::default();

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                attrs.name = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("base") {
                attrs.base = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `name` or `base`"))
            }
        })?;
    }

    Ok(attrs)
}

fn field_attrs(field: &syn::Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("required") {
                attrs.required = true;
            } else if meta.path.is_ident("rename") {
                attrs.rename = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("reference") {
                attrs.reference = Some(Reference::Single(meta.value()?.parse()?));
            } else if meta.path.is_ident("references") {
                attrs.reference = Some(Reference::Many(meta.value()?.parse()?));
            } else {
                return Err(meta.error("expected `required`, `rename`, `reference` or `references`"));
            }
            Ok(())
        })?;
    }

    Ok(attrs)
}

fn schema_fields(input: &DeriveInput) -> syn::Result<Vec<TokenStream2>> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            Fields::Unit => return Ok(Vec::new()),
            Fields::Unnamed(unnamed) => {
                return Err(syn::Error::new(unnamed.span(), "Entity cannot be derived for tuple structs"));
            }
        },
        _ => return Err(syn::Error::new(input.span(), "Entity can only be derived for structs")),
    };

    let mut defs = Vec::new();

    for field in fields {
        let attrs = field_attrs(field)?;

        if !attrs.required && attrs.reference.is_none() {
            continue;
        }

        let name = match (&attrs.rename, &field.ident) {
            (Some(rename), _) => rename.value(),
            (None, Some(ident)) => ident.to_string(),
            (None, None) => continue,
        };

        let mut def = match &attrs.reference {
            Some(Reference::Single(entity)) => quote! {
                ::docbind::schema::FieldDef::new(#name, ::docbind::schema::FieldKind::ObjectId).reference(#entity)
            },
            Some(Reference::Many(entity)) => quote! {
                ::docbind::schema::FieldDef::new(#name, ::docbind::schema::FieldKind::Array).reference(#entity)
            },
            None => quote! {
                ::docbind::schema::FieldDef::new(#name, ::docbind::schema::FieldKind::Any)
            },
        };

        if attrs.required {
            def = quote! { #def.required() };
        }

        defs.push(def);
    }

    Ok(defs)
}

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let container = container_attrs(&input)?;
    let fields = schema_fields(&input)?;

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let name = container
        .name
        .map(|lit| lit.value())
        .unwrap_or_else(|| ident.to_string());

    let base = match container.base {
        Some(base) => quote! { ::core::option::Option::Some(#base) },
        None => quote! { ::core::option::Option::None },
    };

    Ok(quote! {
        impl #impl_generics ::docbind::entity::Entity for #ident #ty_generics #where_clause {
            fn entity_name() -> &'static str {
                #name
            }

            fn schema() -> ::docbind::schema::Schema {
                ::docbind::schema::Schema::builder()
                    #(.field(#fields))*
                    .build()
            }

            fn base_entity() -> ::core::option::Option<&'static str> {
                #base
            }
        }
    })
}
