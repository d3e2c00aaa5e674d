//! The `#[resumable]` attribute: rewrites a function using `.await` and
//! `yield_!` into a hand-rolled `Future` or `Stream` chosen by its declared
//! return type.
//!
//! ```ignore
//! use futures::Stream;
//! use stateful_macros::{resumable, yield_};
//!
//! #[resumable]
//! fn countdown(from: u32) -> impl Stream<Item = Result<u32, ()>> {
//!     let mut n = from;
//!     while n > 0 {
//!         yield_!(n);
//!         n -= 1;
//!     }
//! }
//! ```

extern crate proc_macro;

#[macro_use]
extern crate log;

use proc_macro::TokenStream;
use quote::{quote_spanned, ToTokens};
use syn::spanned::Spanned;
use syn::{parse_macro_input, Item};

use stateful::{Config, Directives, Transform};

/// Transforms the annotated function. Accepts `default`, `pinned`,
/// `movable`, `heap_indirected` and `bound = Type`.
#[proc_macro_attribute]
pub fn resumable(attr: TokenStream, item: TokenStream) -> TokenStream {
    let directives = parse_macro_input!(attr as Directives);
    let item = parse_macro_input!(item as Item);

    let item = match item {
        Item::Fn(item) => item,
        item => return stateful::not_a_function(&item).to_compile_error().into(),
    };

    let transform = Transform::new(&item)
        .directives(directives)
        .with_config(Config::from_env());

    match transform.run() {
        Ok(transformed) => {
            let tokens = transformed.into_token_stream();
            debug!("resumable `{}`:\n{}", item.sig.ident, tokens);
            tokens.into()
        }
        Err(err) => {
            debug!("resumable `{}` rejected: {}", item.sig.ident, err);
            err.to_compile_error().into()
        }
    }
}

/// Hands a value to the consumer of a `#[resumable]` stream. Only
/// meaningful inside such a function, where `#[resumable]` rewrites it.
#[proc_macro]
pub fn yield_(input: TokenStream) -> TokenStream {
    let input = proc_macro2::TokenStream::from(input);
    let span = input.span();
    quote_spanned!(span=>
        ::core::compile_error!("`yield_!` may only be used inside a `#[resumable]` function returning a stream")
    )
    .into()
}
