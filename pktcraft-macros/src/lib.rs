// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2024 Nathaniel Bennett <me[at]nathanielbennett[dotcom]>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use syn::parse_macro_input;

// ======================================================
//              Protocol Field Table Derive
// ======================================================

// A protocol header is a struct whose named members are all `Field`s, declared in wire order.
// Deriving `Protocol` turns that declaration into the name->field dispatch table used for
// attribute-style access, so that the ordered list of field names, the by-name lookups and the
// ordered iteration can never drift apart from the struct itself.
//
// ```
// #[derive(Clone, Debug, Protocol)]
// #[protocol(name = "UDP", layer = 4, id = 17)]
// pub struct Udp {
//     srcport: Field,
//     dstport: Field,
//     length: Field,
//     checksum: Field,
// }
// ```
//
// A member may be exposed under a different name with `#[field(name = "type")]` (useful for
// names that are Rust keywords). `payload_field = "..."` in the `protocol` attribute names the
// field holding the identifier of the next protocol, which the decoder uses for dispatch.

struct ProtocolAttrs {
    name: String,
    layer: u8,
    id: u32,
    payload_field: Option<String>,
}

fn parse_protocol_attrs(ast: &syn::DeriveInput) -> ProtocolAttrs {
    let meta = ast
        .attrs
        .iter()
        .find(|&a| a.path.is_ident("protocol"))
        .expect("protocol attribute required for deriving `Protocol`")
        .parse_meta()
        .expect("protocol attribute must be a list of `key = value` pairs");

    let list = match meta {
        syn::Meta::List(list) => list,
        _ => panic!("protocol attribute must be of the form #[protocol(name = \"...\", ...)]"),
    };

    let mut name = None;
    let mut layer = None;
    let mut id = None;
    let mut payload_field = None;

    for nested in list.nested.iter() {
        let nv = match nested {
            syn::NestedMeta::Meta(syn::Meta::NameValue(nv)) => nv,
            _ => panic!("protocol attribute entries must be `key = value` pairs"),
        };

        if nv.path.is_ident("name") {
            name = Some(lit_str(&nv.lit, "name"));
        } else if nv.path.is_ident("layer") {
            layer = Some(
                lit_int(&nv.lit, "layer")
                    .base10_parse::<u8>()
                    .expect("protocol layer must fit in a u8"),
            );
        } else if nv.path.is_ident("id") {
            id = Some(
                lit_int(&nv.lit, "id")
                    .base10_parse::<u32>()
                    .expect("protocol id must fit in a u32"),
            );
        } else if nv.path.is_ident("payload_field") {
            payload_field = Some(lit_str(&nv.lit, "payload_field"));
        } else {
            panic!("unknown key in protocol attribute");
        }
    }

    ProtocolAttrs {
        name: name.expect("protocol attribute requires `name`"),
        layer: layer.expect("protocol attribute requires `layer`"),
        id: id.expect("protocol attribute requires `id`"),
        payload_field,
    }
}

fn lit_str(lit: &syn::Lit, key: &str) -> String {
    match lit {
        syn::Lit::Str(s) => s.value(),
        _ => panic!("protocol attribute `{}` must be a string literal", key),
    }
}

fn lit_int<'a>(lit: &'a syn::Lit, key: &str) -> &'a syn::LitInt {
    match lit {
        syn::Lit::Int(i) => i,
        _ => panic!("protocol attribute `{}` must be an integer literal", key),
    }
}

/// The exposed name of a struct member: `#[field(name = "...")]` if present, else the member
/// identifier itself.
fn field_name(field: &syn::Field) -> String {
    let renamed = field
        .attrs
        .iter()
        .find(|&a| a.path.is_ident("field"))
        .map(|a| match a.parse_meta() {
            Ok(syn::Meta::List(list)) => list
                .nested
                .iter()
                .find_map(|nested| match nested {
                    syn::NestedMeta::Meta(syn::Meta::NameValue(nv)) if nv.path.is_ident("name") => {
                        Some(lit_str(&nv.lit, "name"))
                    }
                    _ => None,
                })
                .expect("field attribute requires `name = \"...\"`"),
            _ => panic!("field attribute must be of the form #[field(name = \"...\")]"),
        });

    renamed.unwrap_or_else(|| {
        field
            .ident
            .as_ref()
            .expect("Protocol fields must be named")
            .to_string()
    })
}

#[proc_macro_derive(Protocol, attributes(protocol, field))]
pub fn derive_protocol(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let ast = parse_macro_input!(input as syn::DeriveInput);
    let protocol_type = &ast.ident;
    let attrs = parse_protocol_attrs(&ast);

    let fields = match &ast.data {
        syn::Data::Struct(data_struct) => match &data_struct.fields {
            syn::Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
            _ => panic!("Protocol fields must be named"),
        },
        _ => panic!("Only structs are currently supported for `Protocol` derive"),
    };

    let idents: Vec<&syn::Ident> = fields
        .iter()
        .map(|f| f.ident.as_ref().expect("Protocol fields must be named"))
        .collect();
    let names: Vec<String> = fields.iter().map(|f| field_name(f)).collect();

    let name = &attrs.name;
    let layer = attrs.layer;
    let id = attrs.id;
    let payload_field = match &attrs.payload_field {
        Some(field) => {
            assert!(
                names.contains(field),
                "payload_field must name one of the protocol's fields"
            );
            quote::quote! { Some(#field) }
        }
        None => quote::quote! { None },
    };

    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let expanded = quote::quote! {
        impl #impl_generics crate::layers::traits::ProtocolMeta for #protocol_type #ty_generics #where_clause {
            const NAME: &'static str = #name;
            const LAYER: u8 = #layer;
            const PROTOCOL_ID: u32 = #id;
            const PAYLOAD_FIELD: Option<&'static str> = #payload_field;
            const FIELD_NAMES: &'static [&'static str] = &[#(#names),*];
        }

        impl #impl_generics crate::layers::traits::ProtocolFields for #protocol_type #ty_generics #where_clause {
            #[inline]
            fn name(&self) -> &'static str {
                #name
            }

            #[inline]
            fn layer(&self) -> u8 {
                #layer
            }

            #[inline]
            fn protocol_id(&self) -> u32 {
                #id
            }

            #[inline]
            fn payload_field(&self) -> Option<&'static str> {
                #payload_field
            }

            #[inline]
            fn field_names(&self) -> &'static [&'static str] {
                <Self as crate::layers::traits::ProtocolMeta>::FIELD_NAMES
            }

            fn field(&self, name: &str) -> Option<&crate::fields::Field> {
                match name {
                    #(#names => Some(&self.#idents),)*
                    _ => None,
                }
            }

            fn field_mut(&mut self, name: &str) -> Option<&mut crate::fields::Field> {
                match name {
                    #(#names => Some(&mut self.#idents),)*
                    _ => None,
                }
            }

            #[inline]
            fn fields(&self) -> Vec<&crate::fields::Field> {
                vec![#(&self.#idents),*]
            }

            #[inline]
            fn as_any(&self) -> &dyn core::any::Any {
                self
            }

            #[inline]
            fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
                self
            }

            #[inline]
            fn clone_boxed(&self) -> Box<dyn crate::layers::traits::Protocol> {
                Box::new(self.clone())
            }
        }
    };

    proc_macro::TokenStream::from(expanded)
}
