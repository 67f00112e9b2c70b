//! `#[register_handler]` implementation.
//!
//! Re-emits the annotated `impl HandleMessage<M> for H` block unchanged and
//! adds a `MESSAGE_HANDLERS` entry registering `H` for `M`.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::meta::ParseNestedMeta;
use syn::{GenericArgument, ItemImpl, LitStr, Path, PathArguments, Type, spanned::Spanned};

#[derive(Default)]
struct HandlerArgs {
    constructor: Option<Path>,
    krate: Option<Path>,
}

impl HandlerArgs {
    fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("constructor") {
            self.constructor = Some(meta.value()?.parse::<LitStr>()?.parse()?);
        } else if meta.path.is_ident("crate") {
            self.krate = Some(meta.value()?.parse::<LitStr>()?.parse()?);
        } else {
            return Err(meta.error("expected `constructor` or `crate`"));
        }
        Ok(())
    }
}

pub fn register_handler(args: TokenStream, item: &ItemImpl) -> syn::Result<TokenStream> {
    let mut parsed = HandlerArgs::default();
    let parser = syn::meta::parser(|meta| parsed.parse(meta));
    syn::parse::Parser::parse2(parser, args)?;

    if !item.generics.params.is_empty() {
        return Err(syn::Error::new(
            item.generics.span(),
            "#[register_handler] does not support generic impls",
        ));
    }

    let message = message_type(item)?;
    let handler = &item.self_ty;
    let krate = parsed
        .krate
        .unwrap_or_else(|| syn::parse_quote!(::conveyor_framework));
    let construct = match parsed.constructor {
        Some(path) => quote!(#path()),
        None => quote!(<#handler as ::core::default::Default>::default()),
    };

    let static_name = format_ident!(
        "__CONVEYOR_HANDLER_{}_{}",
        type_label(handler),
        type_label(&message)
    );

    Ok(quote! {
        #item

        #[#krate::linkme::distributed_slice(#krate::MESSAGE_HANDLERS)]
        #[linkme(crate = #krate::linkme)]
        #[allow(non_upper_case_globals)]
        static #static_name: fn(&mut #krate::HandlerRegistry) = |registry| {
            registry.register::<#message, #handler>(#construct);
        };
    })
}

/// Extracts `M` from `impl HandleMessage<M> for H`.
fn message_type(item: &ItemImpl) -> syn::Result<Type> {
    let Some((_, trait_path, _)) = &item.trait_ else {
        return Err(syn::Error::new(
            item.span(),
            "#[register_handler] must be placed on an `impl HandleMessage<M> for H` block",
        ));
    };

    let segment = trait_path
        .segments
        .last()
        .filter(|s| s.ident == "HandleMessage")
        .ok_or_else(|| syn::Error::new(trait_path.span(), "expected `HandleMessage<M>`"))?;

    if let PathArguments::AngleBracketed(args) = &segment.arguments {
        if let Some(GenericArgument::Type(ty)) = args.args.first() {
            return Ok(ty.clone());
        }
    }
    Err(syn::Error::new(
        segment.span(),
        "expected a message type argument: `HandleMessage<M>`",
    ))
}

/// Upper-cased last path segment of a type, for naming the generated static.
fn type_label(ty: &Type) -> String {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|s| s.ident.to_string().to_uppercase())
            .unwrap_or_default(),
        _ => "HANDLER".to_string(),
    }
}
