//! RouteGroup 宏实现

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, LitBool, LitStr, Token};

use crate::utils;

#[derive(Default)]
struct GroupArgs {
    prefix: Option<LitStr>,
    parent: Option<syn::Path>,
    middleware: Vec<LitStr>,
    skip: bool,
}

fn parse_group_args(input: &DeriveInput) -> syn::Result<GroupArgs> {
    let mut args = GroupArgs::default();

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("group")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("prefix") {
                args.prefix = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("parent") {
                args.parent = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("middleware") {
                args.middleware = utils::parse_middleware(meta.value()?)?;
            } else if meta.path.is_ident("skip") {
                // `skip` 或 `skip = true`
                args.skip = if meta.input.peek(Token![=]) {
                    meta.value()?.parse::<LitBool>()?.value
                } else {
                    true
                };
            } else {
                return Err(meta.error("unsupported group attribute"));
            }
            Ok(())
        })?;
    }

    Ok(args)
}

pub fn derive_route_group_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    utils::reject_generics(input, "RouteGroup")?;

    let name = &input.ident;
    let args = parse_group_args(input)?;

    let prefix = args
        .prefix
        .unwrap_or_else(|| LitStr::new("", proc_macro2::Span::call_site()));
    let middleware = &args.middleware;
    let skip = args.skip;

    let parent = args.parent.map(|parent| {
        quote! { .parent::<#parent>() }
    });

    Ok(quote! {
        impl ::manticore_web::group::RouteGroup for #name {
            fn declaration() -> ::manticore_web::group::GroupDeclaration {
                const MIDDLEWARE: &[&str] = &[#(#middleware),*];
                ::manticore_web::group::GroupDeclaration::new(#prefix)
                    .middleware(MIDDLEWARE)
                    .skip(#skip)
                    #parent
            }
        }

        // 提交到全局分组注册表
        ::manticore_web::inventory::submit! {
            ::manticore_web::controller::GroupRegistration {
                controller: ::manticore_web::controller::ControllerId::of::<#name>,
                declaration: <#name as ::manticore_web::group::RouteGroup>::declaration,
            }
        }
    })
}
