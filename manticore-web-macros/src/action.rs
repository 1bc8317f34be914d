//! ActionRoute 宏实现

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, DeriveInput, LitStr};

use crate::utils;

const METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "TRACE",
];

struct ActionArgs {
    method: LitStr,
    path: LitStr,
    controller: Option<syn::Path>,
    middleware: Vec<LitStr>,
    schema: Option<syn::Path>,
}

fn parse_action_args(input: &DeriveInput) -> syn::Result<ActionArgs> {
    let mut method: Option<LitStr> = None;
    let mut path: Option<LitStr> = None;
    let mut controller: Option<syn::Path> = None;
    let mut middleware: Vec<LitStr> = Vec::new();
    let mut schema: Option<syn::Path> = None;

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("action")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("method") {
                method = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("path") {
                path = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("controller") {
                controller = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("middleware") {
                middleware = utils::parse_middleware(meta.value()?)?;
            } else if meta.path.is_ident("schema") {
                schema = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unsupported action attribute"));
            }
            Ok(())
        })?;
    }

    let method = method.ok_or_else(|| {
        syn::Error::new_spanned(&input.ident, "missing `#[action(method = \"...\")]`")
    })?;
    let upper = method.value().to_ascii_uppercase();
    if !METHODS.contains(&upper.as_str()) {
        return Err(syn::Error::new_spanned(
            &method,
            format!("unsupported HTTP method `{}`", method.value()),
        ));
    }

    Ok(ActionArgs {
        method: LitStr::new(&upper, method.span()),
        path: path.unwrap_or_else(|| LitStr::new("/", proc_macro2::Span::call_site())),
        controller,
        middleware,
        schema,
    })
}

pub fn derive_action_route_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    utils::reject_generics(input, "ActionRoute")?;

    let name = &input.ident;
    let args = parse_action_args(input)?;

    let method = &args.method;
    let path = &args.path;
    let middleware = &args.middleware;

    // 未指定 controller 时，Action 自身即控制器
    let controller = match &args.controller {
        Some(controller) => quote! { #controller },
        None => quote! { #name },
    };

    let schema = match &args.schema {
        Some(schema) => quote! {
            ::std::option::Option::Some(#schema as fn() -> ::manticore_web::validation::ValidationSchema)
        },
        None => quote! { ::std::option::Option::None },
    };

    let create = format_ident!("__manticore_create_{}", name.to_string().to_lowercase());

    Ok(quote! {
        #[doc(hidden)]
        #[allow(non_snake_case)]
        fn #create() -> ::std::sync::Arc<dyn ::manticore_web::action::Action> {
            ::std::sync::Arc::new(<#name as ::std::default::Default>::default())
        }

        // 提交到全局 Action 注册表
        ::manticore_web::inventory::submit! {
            ::manticore_web::controller::ActionRegistration {
                controller: ::manticore_web::controller::ControllerId::of::<#controller>,
                method: #method,
                path: #path,
                middleware: &[#(#middleware),*],
                schema: #schema,
                create: #create,
            }
        }
    })
}
