//! Attribute macros that run `async fn` tests and entry points on the
//! `core_async` runtime without a direct Tokio dependency.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Runs an `async fn` test through `core_async::runtime::block_on`.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, Entry::Test)
}

/// Runs an `async fn main` through `core_async::runtime::block_on`.
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, Entry::Main)
}

enum Entry {
    Test,
    Main,
}

fn expand(attr: TokenStream, item: TokenStream, entry: Entry) -> TokenStream {
    if !attr.is_empty() {
        let tokens = TokenStream2::from(attr);
        return syn::Error::new_spanned(tokens, "core_async attribute macros take no arguments")
            .to_compile_error()
            .into();
    }

    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            input.sig.fn_token,
            "core_async attribute macros require `async fn`",
        )
        .to_compile_error()
        .into();
    }

    let mut sig = input.sig.clone();
    sig.asyncness = None;

    let attrs = input.attrs;
    let vis = input.vis;
    let body = input.block;

    let test_attr = match entry {
        Entry::Test => quote!(#[test]),
        Entry::Main => quote!(),
    };

    quote! {
        #(#attrs)*
        #test_attr
        #vis #sig {
            core_async::runtime::block_on(async move #body)
        }
    }
    .into()
}
