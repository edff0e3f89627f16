//! Procedural macros for ison builtin functions.
//!
//! Provides the `#[builtin]` attribute macro for defining entries in the
//! function registry without hand-writing a `register_*` call for each one.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Parse builtin attribute arguments: name = "...", raw = true/false
fn parse_builtin_args(attr_stream: TokenStream) -> (String, bool) {
    let attr_str = attr_stream.to_string();

    let mut name = String::new();
    let mut raw = false;

    if let Some(start) = attr_str.find("name = \"") {
        let rest = &attr_str[start + 8..];
        if let Some(end) = rest.find('"') {
            name = rest[..end].to_string();
        }
    }

    if let Some(start) = attr_str.find("raw") {
        let rest = &attr_str[start..];
        raw = rest
            .trim_start_matches("raw")
            .trim_start()
            .trim_start_matches('=')
            .trim_start()
            .starts_with("true");
    }

    (name, raw)
}

/// Attribute macro for defining ison builtin functions.
///
/// Generates a `register_<fn>(registry: &mut Registry)` function that inserts
/// the decorated function into the registry under the given name, along with
/// its `raw_args` calling convention (see the registry module for what that
/// flag means).
///
/// # Example
///
/// ```ignore
/// #[builtin(name = "math.add")]
/// pub fn add(ev: &mut Evaluator, args: &[Value], flags: &[bool], name: &str) -> Result<(Value, bool), Error> {
///     // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn builtin(attr: TokenStream, item: TokenStream) -> TokenStream {
    let func = parse_macro_input!(item as ItemFn);

    let (ison_name, raw_args) = parse_builtin_args(attr);

    let fn_name = func.sig.ident.clone();
    let fn_ident_str = fn_name.to_string();

    let name_to_use = if !ison_name.is_empty() {
        ison_name
    } else {
        fn_ident_str.replace('_', "-")
    };

    let register_fn_name = quote::format_ident!("register_{}", fn_name);

    let expanded = quote! {
        #func

        #[allow(dead_code)]
        pub fn #register_fn_name(reg: &mut crate::registry::Registry) {
            reg.define(#name_to_use, #raw_args, #fn_name);
        }
    };

    TokenStream::from(expanded)
}
