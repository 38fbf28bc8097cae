use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    Data, DeriveInput, Field, Fields, LitBool, LitInt, LitStr, Result, parse_macro_input,
};

/// Derive `runkit_cliconf::Config` for a struct with named fields.
///
/// Every field that should be populated carries a `#[config(...)]` attribute;
/// fields without one are left alone.
///
/// ```ignore
/// #[derive(Default, Config)]
/// struct Serve {
///     #[config(flag = "port", env = "PORT", default = "8080", description = "Listen port")]
///     port: u16,
///     #[config(flag = "verbose")]
///     verbose: bool,
///     #[config(arg = 0)]
///     target: String,
///     #[config(remaining)]
///     rest: Vec<String>,
///     #[config(flag = "tls", json, optional)]
///     tls: TlsSettings,
///     #[config(flatten)]
///     db: DbConfig,
/// }
/// ```
///
/// Keys:
/// - `flag = "name"`, also `flag = ",remaining"` and `flag = ",argN"`
/// - `env = "NAME"`
/// - `default = "value"`
/// - `optional`, `optional = bool`, `required = bool`
/// - `description = "..."` (or `help = "..."`)
/// - `arg = N`, `remaining`
/// - `flatten` for nested config structs
/// - `json` to decode a JSON object literal, `from_str` to use `FromStr`
#[proc_macro_derive(Config, attributes(config))]
pub fn derive_config(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_config(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct FieldAttrs {
    flag: Option<LitStr>,
    env: Option<LitStr>,
    default: Option<LitStr>,
    optional: bool,
    description: Option<LitStr>,
    arg: Option<usize>,
    remaining: bool,
    flatten: bool,
    json: bool,
    from_str: bool,
    // Set once any key other than `flatten` is seen.
    other_keys: bool,
}

fn expand_config(input: DeriveInput) -> Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Config can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Config can only be derived for structs with named fields",
        ));
    };

    let mut stmts = Vec::new();
    for field in &fields.named {
        if let Some(stmt) = expand_field(field)? {
            stmts.push(stmt);
        }
    }

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::runkit_cliconf::Config for #ident #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn bind<'__cfg>(
                &'__cfg mut self,
                prefix: &str,
                out: &mut ::std::vec::Vec<::runkit_cliconf::Binding<'__cfg>>,
            ) {
                #(#stmts)*
            }
        }
    })
}

fn expand_field(field: &Field) -> Result<Option<TokenStream2>> {
    let Some(attrs) = parse_field_attrs(field)? else {
        return Ok(None);
    };
    let Some(ident) = field.ident.as_ref() else {
        return Ok(None);
    };
    let raw_name = ident.to_string();
    let name = LitStr::new(raw_name.trim_start_matches("r#"), Span::call_site());

    if attrs.flatten {
        return Ok(Some(quote! {
            ::runkit_cliconf::Config::bind(
                &mut self.#ident,
                &::runkit_cliconf::qualify(prefix, #name),
                out,
            );
        }));
    }

    let mut spec = quote! {
        ::runkit_cliconf::FieldSpec::new(::runkit_cliconf::qualify(prefix, #name))
    };
    if let Some(flag) = &attrs.flag {
        spec = quote!(#spec.flag(#flag));
    }
    if let Some(env) = &attrs.env {
        spec = quote!(#spec.env(#env));
    }
    if let Some(default) = &attrs.default {
        spec = quote!(#spec.default_value(#default));
    }
    if attrs.optional {
        spec = quote!(#spec.optional(true));
    }
    if let Some(n) = attrs.arg {
        spec = quote!(#spec.arg(#n));
    }
    if let Some(description) = &attrs.description {
        spec = quote!(#spec.description(#description));
    }

    let binding = if attrs.remaining {
        quote!(::runkit_cliconf::Binding::remaining(#spec, &mut self.#ident))
    } else if attrs.json {
        quote!(::runkit_cliconf::Binding::json(#spec, &mut self.#ident))
    } else if attrs.from_str {
        quote!(::runkit_cliconf::Binding::from_str(#spec, &mut self.#ident))
    } else {
        quote!(::runkit_cliconf::Binding::value(#spec, &mut self.#ident))
    };

    Ok(Some(quote! { out.push(#binding); }))
}

fn parse_field_attrs(field: &Field) -> Result<Option<FieldAttrs>> {
    let mut attrs: Option<FieldAttrs> = None;

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("config")) {
        let out = attrs.get_or_insert_with(FieldAttrs::default);
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("flatten") {
                out.flatten = true;
                return Ok(());
            }
            out.other_keys = true;

            if meta.path.is_ident("flag") {
                let lit: LitStr = meta.value()?.parse()?;
                let value = lit.value();
                if let Some(form) = value.strip_prefix(',') {
                    if form == "remaining" {
                        out.remaining = true;
                    } else if let Some(n) = form.strip_prefix("arg") {
                        let n = n.parse::<usize>().map_err(|_| {
                            syn::Error::new(lit.span(), format!("invalid positional form: {value}"))
                        })?;
                        out.arg = Some(n);
                    } else {
                        return Err(syn::Error::new(
                            lit.span(),
                            format!("unknown flag form: {value}"),
                        ));
                    }
                } else {
                    out.flag = Some(lit);
                }
            } else if meta.path.is_ident("env") {
                out.env = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("default") {
                out.default = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("optional") {
                out.optional = if meta.input.peek(syn::Token![=]) {
                    meta.value()?.parse::<LitBool>()?.value
                } else {
                    true
                };
            } else if meta.path.is_ident("required") {
                out.optional = !meta.value()?.parse::<LitBool>()?.value;
            } else if meta.path.is_ident("description") || meta.path.is_ident("help") {
                out.description = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("arg") {
                out.arg = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("remaining") {
                out.remaining = true;
            } else if meta.path.is_ident("json") {
                out.json = true;
            } else if meta.path.is_ident("from_str") {
                out.from_str = true;
            } else {
                return Err(meta.error("unknown config attribute"));
            }
            Ok(())
        })?;
    }

    let Some(attrs) = attrs else {
        return Ok(None);
    };
    check_field_attrs(field, &attrs)?;
    Ok(Some(attrs))
}

fn check_field_attrs(field: &Field, attrs: &FieldAttrs) -> Result<()> {
    let err = |msg: &str| Err(syn::Error::new_spanned(field_span_target(field), msg));

    if attrs.flatten {
        if attrs.other_keys {
            return err("`flatten` cannot be combined with other config keys");
        }
        return Ok(());
    }

    let named = attrs.flag.is_some() || attrs.env.is_some();
    let positional = attrs.arg.is_some() || attrs.remaining;
    if !named && !positional {
        return err("field has no flag, env, arg or remaining key");
    }
    if named && positional {
        return err("positional fields cannot also declare a flag or env");
    }
    if attrs.arg.is_some() && attrs.remaining {
        return err("a field cannot be both `arg` and `remaining`");
    }
    if attrs.json && attrs.from_str {
        return err("`json` and `from_str` are mutually exclusive");
    }
    if attrs.remaining && (attrs.json || attrs.from_str) {
        return err("`remaining` fields are always `Vec<String>`");
    }
    Ok(())
}

fn field_span_target(field: &Field) -> TokenStream2 {
    match &field.ident {
        Some(ident) => quote!(#ident),
        None => {
            let ty = &field.ty;
            quote!(#ty)
        }
    }
}
