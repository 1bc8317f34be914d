//! 宏辅助工具函数

use syn::parse::ParseStream;
use syn::punctuated::Punctuated;
use syn::{bracketed, DeriveInput, LitStr, Token};

/// 解析 `"name"` 或 `["a", "b"]`
pub fn parse_middleware(input: ParseStream) -> syn::Result<Vec<LitStr>> {
    if input.peek(syn::token::Bracket) {
        let content;
        bracketed!(content in input);
        let names = Punctuated::<LitStr, Token![,]>::parse_terminated(&content)?;
        Ok(names.into_iter().collect())
    } else {
        Ok(vec![input.parse()?])
    }
}

/// 注册项在模块作用域提交，不支持泛型类型
pub fn reject_generics(input: &DeriveInput, what: &str) -> syn::Result<()> {
    if input.generics.params.is_empty() {
        Ok(())
    } else {
        Err(syn::Error::new_spanned(
            &input.generics,
            format!("{} cannot be derived for generic types", what),
        ))
    }
}
