//! Derive macro for armature activators.
//!
//! `#[derive(Activate)]` generates an `impl armature::Activator for T`,
//! resolving each `#[dep]`-annotated field from the request context and
//! filling the rest with `Default::default()`. This is deliberately
//! explicit rather than reflective: the generated code is ordinary
//! `ctx.resolve` calls, not runtime field enumeration.
//!
//! # Example
//!
//! ```rust,ignore
//! use armature::{Activate, ContainerBuilder};
//! use std::sync::Arc;
//!
//! #[derive(Clone)]
//! struct Config { debug: bool }
//!
//! #[derive(Clone, Activate)]
//! struct Database {
//!     #[dep]
//!     config: Arc<Config>,
//!     connections: u32,
//! }
//!
//! let mut builder = ContainerBuilder::new();
//! builder.register_singleton::<Config, _>(|_| Ok(Config { debug: true })).unwrap();
//! builder.register_builder(
//!     armature::ComponentRegistration::builder(Arc::new(Database { config: Arc::new(Config { debug: false }), connections: 0 }))
//!         .with_service(armature::ServiceKey::typed::<Database>())
//!         .build(),
//! ).unwrap();
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Type};

/// Derive macro for the `Activator` trait.
///
/// # Attributes
///
/// - `#[dep]` - Resolve this field from the request context. Must be `Arc<T>`.
/// - `#[dep(optional)]` - Resolve via `try_resolve`. Must be `Option<Arc<T>>`.
///
/// Fields without `#[dep]` are built with `Default::default()`.
#[proc_macro_derive(Activate, attributes(dep))]
pub fn derive_activate(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return syn::Error::new_spanned(
                    &input,
                    "Activate can only be derived for structs with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(&input, "Activate can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    let mut field_inits = Vec::new();

    for field in fields.iter() {
        let field_name = field.ident.as_ref().unwrap();
        let field_type = &field.ty;

        match find_dep_attr(&field.attrs) {
            Some(DepAttr::Required) => {
                let Some(inner) = extract_arc_inner_type(field_type) else {
                    return syn::Error::new_spanned(
                        field_type,
                        "Fields marked with #[dep] must have type Arc<T>",
                    )
                    .to_compile_error()
                    .into();
                };
                field_inits.push(quote! {
                    #field_name: {
                        let __resolved = __ctx.resolve(::armature::ServiceKey::typed::<#inner>())?;
                        __resolved
                            .downcast::<#inner>()
                            .map_err(|_| ::armature::DiError::internal(
                                "resolved dependency did not match the requested type"
                            ))?
                    }
                });
            }
            Some(DepAttr::Optional) => {
                let Some(inner) = extract_option_arc_inner_type(field_type) else {
                    return syn::Error::new_spanned(
                        field_type,
                        "Fields marked with #[dep(optional)] must have type Option<Arc<T>>",
                    )
                    .to_compile_error()
                    .into();
                };
                field_inits.push(quote! {
                    #field_name: match __ctx.try_resolve(::armature::ServiceKey::typed::<#inner>())? {
                        Some(__resolved) => Some(
                            __resolved
                                .downcast::<#inner>()
                                .map_err(|_| ::armature::DiError::internal(
                                    "resolved dependency did not match the requested type"
                                ))?
                        ),
                        None => None,
                    }
                });
            }
            None => {
                field_inits.push(quote! {
                    #field_name: ::std::default::Default::default()
                });
            }
        }
    }

    let expanded = quote! {
        impl #impl_generics ::armature::Activator for #name #ty_generics #where_clause {
            fn activate(
                &self,
                __ctx: &::armature::ResolveRequestContext,
                _parameters: &[::std::sync::Arc<dyn ::armature::Parameter>],
            ) -> ::armature::Result<::armature::AnyArc> {
                Ok(::std::sync::Arc::new(Self {
                    #(#field_inits),*
                }) as ::armature::AnyArc)
            }

            fn description(&self) -> &str {
                ::std::concat!("Activate<", ::std::stringify!(#name), ">")
            }
        }
    };

    TokenStream::from(expanded)
}

enum DepAttr {
    Required,
    Optional,
}

fn find_dep_attr(attrs: &[Attribute]) -> Option<DepAttr> {
    for attr in attrs {
        if attr.path().is_ident("dep") {
            if attr.meta.require_path_only().is_ok() {
                return Some(DepAttr::Required);
            }
            if let Ok(nested) = attr.parse_args::<syn::Ident>() {
                if nested == "optional" {
                    return Some(DepAttr::Optional);
                }
            }
            return Some(DepAttr::Required);
        }
    }
    None
}

fn extract_arc_inner_type(ty: &Type) -> Option<&Type> {
    if let Type::Path(type_path) = ty {
        let segment = type_path.path.segments.last()?;
        if segment.ident == "Arc" {
            if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
                if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                    return Some(inner);
                }
            }
        }
    }
    None
}

fn extract_option_arc_inner_type(ty: &Type) -> Option<&Type> {
    if let Type::Path(type_path) = ty {
        let segment = type_path.path.segments.last()?;
        if segment.ident == "Option" {
            if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
                if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                    return extract_arc_inner_type(inner);
                }
            }
        }
    }
    None
}
