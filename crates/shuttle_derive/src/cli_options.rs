use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, Path, parse_macro_input, spanned::Spanned};

use crate::utils;

struct CliField {
    ident: syn::Ident,
    long: LitStr,
    env: Option<LitStr>,
    parse_expr: proc_macro2::TokenStream,
}

pub fn derive_cli_options_inner(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    let struct_ident = input.ident.clone();

    let Data::Struct(data_struct) = &input.data else {
        return syn::Error::new(input.span(), "CliOptions can only be derived for structs")
            .to_compile_error()
            .into();
    };

    let Fields::Named(fields) = &data_struct.fields else {
        return syn::Error::new(input.span(), "CliOptions requires named fields")
            .to_compile_error()
            .into();
    };

    let mut cli_fields = Vec::new();

    for field in &fields.named {
        let Some(field_ident) = &field.ident else {
            continue;
        };

        let mut long_name: Option<String> = None;
        let mut env_name: Option<String> = None;
        let mut parse_with: Option<Path> = None;

        for attr in &field.attrs {
            if !attr.path().is_ident("cli") {
                continue;
            }
            let parse_result = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("long") {
                    let lit: LitStr = meta.value()?.parse()?;
                    long_name = Some(lit.value());
                    return Ok(());
                }
                if meta.path.is_ident("env") {
                    let lit: LitStr = meta.value()?.parse()?;
                    env_name = Some(lit.value());
                    return Ok(());
                }
                if meta.path.is_ident("parse_with") {
                    let lit: LitStr = meta.value()?.parse()?;
                    parse_with = Some(syn::parse_str(&lit.value())?);
                    return Ok(());
                }
                Err(meta.error("unsupported cli attribute; expected long/env/parse_with"))
            });
            if let Err(err) = parse_result {
                return err.to_compile_error().into();
            }
        }

        let Some(long_name) = long_name else {
            if env_name.is_some() {
                return syn::Error::new(field.span(), "cli env requires a long name")
                    .to_compile_error()
                    .into();
            }
            continue;
        };

        cli_fields.push(CliField {
            ident: field_ident.clone(),
            long: LitStr::new(&long_name, Span::call_site()),
            env: env_name.map(|env| LitStr::new(&env, Span::call_site())),
            parse_expr: utils::build_cli_parse_expr(&field.ty, parse_with.as_ref()),
        });
    }

    let arms = cli_fields.iter().map(|f| {
        let CliField {
            ident,
            long,
            parse_expr,
            ..
        } = f;
        quote! {
            #long => {
                let raw = value.ok_or_else(|| {
                    crate::Error::invalid_input(format!("Missing value for --{name}"))
                })?;
                self.#ident = #parse_expr;
                Ok(true)
            }
        }
    });

    let env_reads = cli_fields.iter().filter_map(|f| {
        let CliField {
            ident,
            long,
            env,
            parse_expr,
        } = f;
        let env = env.as_ref()?;
        Some(quote! {
            if let Ok(raw) = std::env::var(#env)
                && !raw.trim().is_empty()
            {
                #[allow(unused_variables)]
                let name = #long;
                self.#ident = #parse_expr;
            }
        })
    });

    let names = cli_fields.iter().map(|f| &f.long);

    let expanded = quote! {
        impl #struct_ident {
            fn split_arg(
                raw_name: &str,
                args: &mut std::iter::Peekable<impl Iterator<Item = String>>,
            ) -> (String, Option<String>) {
                if let Some((k, v)) = raw_name.split_once('=') {
                    return (k.to_string(), Some(v.to_string()));
                }

                let value = match args.peek() {
                    Some(next) if !next.starts_with("--") => args.next(),
                    _ => None,
                };

                (raw_name.to_string(), value)
            }

            fn apply_cli_option(
                &mut self,
                name: &str,
                value: Option<String>,
            ) -> crate::Result<bool> {
                match name {
                    #(#arms,)*
                    _ => Ok(false),
                }
            }

            /// Fills fields that declare `#[cli(env = "...")]` from the environment.
            /// Command-line values applied afterwards take precedence.
            fn apply_env_defaults(&mut self) -> crate::Result<()> {
                #(#env_reads)*
                Ok(())
            }

            /// Long option names accepted with a value.
            pub fn cli_option_names() -> &'static [&'static str] {
                &[#(#names),*]
            }
        }
    };

    TokenStream::from(expanded)
}
