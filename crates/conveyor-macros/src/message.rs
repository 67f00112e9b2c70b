//! `#[derive(Message)]` implementation.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, LitStr, Path, spanned::Spanned};

/// Parsed `#[message(...)]` options.
struct MessageAttrs {
    name: Option<String>,
    krate: Option<Path>,
}

pub fn derive_message(input: &DeriveInput) -> syn::Result<TokenStream> {
    if let Data::Union(_) = input.data {
        return Err(syn::Error::new(
            input.span(),
            "Message cannot be derived for unions",
        ));
    }

    let attrs = parse_attrs(&input.attrs)?;
    let ident = &input.ident;
    let message_type = attrs.name.unwrap_or_else(|| ident.to_string());
    let krate = attrs
        .krate
        .unwrap_or_else(|| syn::parse_quote!(::conveyor_core));
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::Message for #ident #ty_generics #where_clause {
            const MESSAGE_TYPE: &'static str = #message_type;
        }
    })
}

fn parse_attrs(attrs: &[Attribute]) -> syn::Result<MessageAttrs> {
    let mut parsed = MessageAttrs {
        name: None,
        krate: None,
    };

    for attr in attrs.iter().filter(|a| a.path().is_ident("message")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let name = meta.value()?.parse::<LitStr>()?;
                if name.value().is_empty() {
                    return Err(meta.error("message name must not be empty"));
                }
                parsed.name = Some(name.value());
            } else if meta.path.is_ident("crate") {
                parsed.krate = Some(meta.value()?.parse::<LitStr>()?.parse()?);
            } else {
                return Err(meta.error("expected `name` or `crate`"));
            }
            Ok(())
        })?;
    }

    Ok(parsed)
}
