//! Derive macros for `FieldCrypt`.
//!
//! `#[derive(Encryptable)]` builds a struct's field-descriptor table from
//! `#[crypt(...)]` field attributes, once, into a `static`.

#![warn(clippy::pedantic, clippy::nursery)]

use heck::{
    ToKebabCase, ToLowerCamelCase, ToPascalCase, ToShoutyKebabCase, ToShoutySnakeCase,
    ToSnakeCase,
};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Field, Fields, LitStr, Token};

/// Derive macro describing which fields of a struct are encrypted.
///
/// Field attributes:
///
/// - `#[crypt(annotation = "aes256,enc-key,mac-key")]` seals the field's value
/// - `#[crypt(nested)]` walks into the field, whose type must itself be
///   `Encryptable` (`Option`, `Vec` and `Box` wrappers are accepted)
/// - `#[crypt(rename = "...")]` states the document field name explicitly
///
/// The document field name follows serde: a field's `#[serde(rename)]`, else
/// the struct's `#[serde(rename_all)]` rule, else the field identifier. A
/// `#[crypt(rename)]` that differs from that name is a compile error.
///
/// # Example
///
/// ```rust,ignore
/// use fieldcrypt_derive::Encryptable;
///
/// #[derive(Serialize, Deserialize, Encryptable)]
/// struct User {
///     name: String,
///     #[crypt(annotation = "aes256,user-enc,user-mac")]
///     ssn: String,
///     #[crypt(nested)]
///     address: Option<Address>,
/// }
/// ```
#[proc_macro_derive(Encryptable, attributes(crypt))]
pub fn derive_encryptable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input).unwrap_or_else(syn::Error::into_compile_error).into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Encryptable cannot be derived for generic structs",
        ));
    }
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Encryptable can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Encryptable requires a struct with named fields",
        ));
    };

    let rename_all = serde_rename_all(&input.attrs)?;
    let mut descriptors = Vec::new();
    for field in &fields.named {
        if let Some(descriptor) = descriptor(field, rename_all.as_ref())? {
            descriptors.push(descriptor);
        }
    }

    let ident = &input.ident;
    Ok(quote! {
        impl ::fieldcrypt::shape::Encryptable for #ident {
            fn shape() -> &'static ::fieldcrypt::shape::Shape {
                static SHAPE: ::std::sync::OnceLock<::fieldcrypt::shape::Shape> =
                    ::std::sync::OnceLock::new();
                SHAPE.get_or_init(|| {
                    ::fieldcrypt::shape::Shape::new(::std::vec![#(#descriptors),*])
                })
            }
        }
    })
}

/// Builds the descriptor expression for one field, or `None` if the field
/// carries no `crypt` attribute.
fn descriptor(field: &Field, rename_all: Option<&LitStr>) -> syn::Result<Option<TokenStream2>> {
    let Some(ident) = &field.ident else {
        return Ok(None);
    };
    let mut rename: Option<LitStr> = None;
    let mut annotation: Option<LitStr> = None;
    let mut nested = false;

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("crypt")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("annotation") {
                let lit: LitStr = meta.value()?.parse()?;
                check_annotation(&lit)?;
                annotation = Some(lit);
                Ok(())
            } else if meta.path.is_ident("rename") {
                rename = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("nested") {
                nested = true;
                Ok(())
            } else {
                Err(meta.error("unknown crypt attribute, expected `annotation`, `nested` or `rename`"))
            }
        })?;
    }

    if annotation.is_none() && !nested {
        return Ok(None);
    }

    let name = serialized_name(ident, &field.attrs, rename_all)?;
    if let Some(rename) = rename {
        if rename.value() != name {
            return Err(syn::Error::new_spanned(
                rename,
                format!("crypt rename disagrees with the serialized field name `{name}`"),
            ));
        }
    }

    let ty = &field.ty;
    match (annotation, nested) {
        (Some(lit), true) => Err(syn::Error::new_spanned(
            lit,
            "a field cannot be both annotated and nested",
        )),
        (Some(lit), false) => Ok(Some(quote! {
            ::fieldcrypt::shape::FieldDescriptor::annotated(#name, #lit)
        })),
        (None, true) => Ok(Some(quote! {
            ::fieldcrypt::shape::FieldDescriptor::nested(
                #name,
                <#ty as ::fieldcrypt::shape::Encryptable>::shape().clone(),
            )
        })),
        (None, false) => Ok(None),
    }
}

/// Name serde gives the field when serializing.
fn serialized_name(
    ident: &syn::Ident,
    attrs: &[Attribute],
    rename_all: Option<&LitStr>,
) -> syn::Result<String> {
    let mut rename: Option<LitStr> = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                if let Some(lit) = serialize_value(&meta)? {
                    rename = Some(lit);
                }
                Ok(())
            } else {
                skip_meta(&meta)
            }
        })?;
    }

    let field = ident.unraw().to_string();
    match (rename, rename_all) {
        (Some(lit), _) => Ok(lit.value()),
        (None, Some(rule)) => apply_rename_rule(rule, &field),
        (None, None) => Ok(field),
    }
}

/// Reads the struct-level `#[serde(rename_all)]` rule for serialization.
fn serde_rename_all(attrs: &[Attribute]) -> syn::Result<Option<LitStr>> {
    let mut rule = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") {
                if let Some(lit) = serialize_value(&meta)? {
                    rule = Some(lit);
                }
                Ok(())
            } else {
                skip_meta(&meta)
            }
        })?;
    }
    Ok(rule)
}

/// Value of `key = "..."` or the `serialize` half of `key(serialize = "...")`.
fn serialize_value(meta: &ParseNestedMeta<'_>) -> syn::Result<Option<LitStr>> {
    if meta.input.peek(Token![=]) {
        return Ok(Some(meta.value()?.parse()?));
    }
    let mut value = None;
    meta.parse_nested_meta(|inner| {
        if inner.path.is_ident("serialize") {
            value = Some(inner.value()?.parse()?);
            Ok(())
        } else {
            skip_meta(&inner)
        }
    })?;
    Ok(value)
}

/// Consumes a serde item this macro has no use for.
fn skip_meta(meta: &ParseNestedMeta<'_>) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|inner| skip_meta(&inner))?;
    }
    Ok(())
}

fn apply_rename_rule(rule: &LitStr, field: &str) -> syn::Result<String> {
    let renamed = match rule.value().as_str() {
        "lowercase" => field.to_ascii_lowercase(),
        "UPPERCASE" => field.to_ascii_uppercase(),
        "PascalCase" => field.to_pascal_case(),
        "camelCase" => field.to_lower_camel_case(),
        "snake_case" => field.to_snake_case(),
        "SCREAMING_SNAKE_CASE" => field.to_shouty_snake_case(),
        "kebab-case" => field.to_kebab_case(),
        "SCREAMING-KEBAB-CASE" => field.to_shouty_kebab_case(),
        other => {
            return Err(syn::Error::new_spanned(rule, format!("unknown rename_all rule `{other}`")));
        }
    };
    Ok(renamed)
}

/// Rejects annotations that can never resolve, at compile time.
fn check_annotation(lit: &LitStr) -> syn::Result<()> {
    let value = lit.value();
    let mut segments = value.split(',');
    if segments.next().map_or(true, str::is_empty) {
        return Err(syn::Error::new_spanned(lit, "annotation must start with an algorithm name"));
    }
    if segments.count() > 2 {
        return Err(syn::Error::new_spanned(lit, "annotation takes at most two key identifiers"));
    }
    Ok(())
}
