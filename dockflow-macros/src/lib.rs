use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, GenericArgument, Lit,
    PathArguments, Type,
};

/// Derives `dockflow_sdk::WorkflowDefinition` for a clap `Args` struct.
///
/// Struct attribute: `#[workflow(id = "...", name = "...", description = "...")]`.
/// Field attribute: `#[field(label = "...", description = "...", type = "...", ...)]` where
/// `type` is one of `text`, `number`, `float`, `file_path`, `dir_path`, `select`.
#[proc_macro_derive(WorkflowDefinition, attributes(workflow, field))]
pub fn derive_workflow_definition(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let workflow_meta = match extract_workflow_meta(&input.attrs) {
        Ok(meta) => meta,
        Err(e) => return e.to_compile_error().into(),
    };

    let named = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return syn::Error::new_spanned(&input.ident, "WorkflowDefinition needs named fields")
                    .to_compile_error()
                    .into()
            }
        },
        _ => {
            return syn::Error::new_spanned(&input.ident, "WorkflowDefinition only supports structs")
                .to_compile_error()
                .into()
        }
    };

    let mut field_schemas = Vec::new();
    for f in named {
        let Some(ident) = f.ident.as_ref() else {
            continue;
        };
        let name = ident.to_string();
        let arg = match extract_arg_meta(&f.attrs, &name) {
            Ok(arg) => arg,
            Err(e) => return e.to_compile_error().into(),
        };
        if arg.hidden {
            continue;
        }
        let meta = match extract_field_meta(&f.attrs) {
            Ok(meta) => meta,
            Err(e) => return e.to_compile_error().into(),
        };

        let field_type = meta
            .field_type_tokens()
            .unwrap_or_else(|| infer_field_type(&f.ty));
        let label = if meta.label.is_empty() {
            name.replace('_', " ")
        } else {
            meta.label.clone()
        };
        let description = &meta.description;
        let cli_arg = &arg.cli_arg;
        let default = match &arg.default {
            Some(DefaultValue::Literal(s)) => quote! { Some(#s.to_string()) },
            Some(DefaultValue::Expr(e)) => quote! { Some((#e).to_string()) },
            None => quote! { None },
        };
        let required = !is_option_type(&f.ty) && arg.default.is_none() && !is_bool_type(&f.ty);
        let stages = &meta.stages;

        field_schemas.push(quote! {
            dockflow_sdk::FieldSchema {
                name: #name.to_string(),
                field_type: #field_type,
                label: #label.to_string(),
                description: #description.to_string(),
                cli_arg: #cli_arg.to_string(),
                required: #required,
                default: #default,
                stages: vec![#(#stages.to_string()),*],
            }
        });
    }

    let struct_name = &input.ident;
    let workflow_id = &workflow_meta.id;
    let workflow_name = &workflow_meta.name;
    let workflow_desc = &workflow_meta.description;

    let expanded = quote! {
        impl dockflow_sdk::WorkflowDefinition for #struct_name {
            fn metadata() -> dockflow_sdk::WorkflowMetadata {
                dockflow_sdk::WorkflowMetadata {
                    id: #workflow_id.to_string(),
                    name: #workflow_name.to_string(),
                    description: #workflow_desc.to_string(),
                }
            }

            fn fields() -> Vec<dockflow_sdk::FieldSchema> {
                vec![#(#field_schemas),*]
            }
        }
    };

    TokenStream::from(expanded)
}

struct WorkflowMeta {
    id: String,
    name: String,
    description: String,
}

fn lit_str(meta: &syn::meta::ParseNestedMeta) -> syn::Result<String> {
    let lit: Lit = meta.value()?.parse()?;
    match lit {
        Lit::Str(s) => Ok(s.value()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

/// Consumes `= <expr>` for keys we do not care about so parsing can continue.
fn skip_value(meta: &syn::meta::ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        let _: Expr = meta.value()?.parse()?;
    }
    Ok(())
}

fn extract_workflow_meta(attrs: &[Attribute]) -> syn::Result<WorkflowMeta> {
    for attr in attrs {
        if !attr.path().is_ident("workflow") {
            continue;
        }
        let mut meta_out = WorkflowMeta {
            id: String::new(),
            name: String::new(),
            description: String::new(),
        };
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                meta_out.id = lit_str(&meta)?;
            } else if meta.path.is_ident("name") {
                meta_out.name = lit_str(&meta)?;
            } else if meta.path.is_ident("description") {
                meta_out.description = lit_str(&meta)?;
            } else {
                skip_value(&meta)?;
            }
            Ok(())
        })?;
        return Ok(meta_out);
    }

    Err(syn::Error::new(
        proc_macro2::Span::call_site(),
        "missing #[workflow(...)] attribute",
    ))
}

#[derive(Default)]
struct FieldMeta {
    label: String,
    description: String,
    field_type: Option<String>,
    min: Option<i64>,
    max: Option<i64>,
    pattern: Option<String>,
    options: Vec<String>,
    stages: Vec<String>,
}

impl FieldMeta {
    fn field_type_tokens(&self) -> Option<proc_macro2::TokenStream> {
        let ft = self.field_type.as_deref()?;
        let tokens = match ft {
            "number" => {
                let min = option_tokens(self.min);
                let max = option_tokens(self.max);
                quote! { dockflow_sdk::FieldType::Number { min: #min, max: #max } }
            }
            "float" => quote! { dockflow_sdk::FieldType::Float },
            "file_path" => {
                let pattern = match &self.pattern {
                    Some(p) => quote! { Some(#p.to_string()) },
                    None => quote! { None },
                };
                quote! { dockflow_sdk::FieldType::FilePath { pattern: #pattern } }
            }
            "dir_path" => quote! { dockflow_sdk::FieldType::DirPath },
            "select" => {
                let options = &self.options;
                quote! { dockflow_sdk::FieldType::Select { options: vec![#(#options.to_string()),*] } }
            }
            _ => quote! { dockflow_sdk::FieldType::Text },
        };
        Some(tokens)
    }
}

fn option_tokens(value: Option<i64>) -> proc_macro2::TokenStream {
    match value {
        Some(v) => quote! { Some(#v) },
        None => quote! { None },
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn extract_field_meta(attrs: &[Attribute]) -> syn::Result<FieldMeta> {
    let mut out = FieldMeta::default();

    for attr in attrs {
        if !attr.path().is_ident("field") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("label") {
                out.label = lit_str(&meta)?;
            } else if meta.path.is_ident("description") {
                out.description = lit_str(&meta)?;
            } else if meta.path.is_ident("type") {
                out.field_type = Some(lit_str(&meta)?);
            } else if meta.path.is_ident("min") {
                out.min = lit_str(&meta)?.parse().ok();
            } else if meta.path.is_ident("max") {
                out.max = lit_str(&meta)?.parse().ok();
            } else if meta.path.is_ident("pattern") {
                out.pattern = Some(lit_str(&meta)?);
            } else if meta.path.is_ident("options") {
                out.options = split_list(&lit_str(&meta)?);
            } else if meta.path.is_ident("stages") {
                out.stages = split_list(&lit_str(&meta)?);
            } else {
                skip_value(&meta)?;
            }
            Ok(())
        })?;
    }

    Ok(out)
}

enum DefaultValue {
    Literal(String),
    Expr(Expr),
}

struct ArgMeta {
    cli_arg: String,
    default: Option<DefaultValue>,
    hidden: bool,
}

/// Reads the parts of clap's `#[arg(...)]` that matter for the schema.
fn extract_arg_meta(attrs: &[Attribute], field_name: &str) -> syn::Result<ArgMeta> {
    let mut long_name = None;
    let mut default = None;
    let mut hidden = false;

    for attr in attrs {
        if !attr.path().is_ident("arg") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("long") {
                if meta.input.peek(syn::Token![=]) {
                    long_name = Some(lit_str(&meta)?);
                } else {
                    long_name = Some(field_name.replace('_', "-"));
                }
            } else if meta.path.is_ident("default_value") {
                default = Some(DefaultValue::Literal(lit_str(&meta)?));
            } else if meta.path.is_ident("default_value_t") {
                if meta.input.peek(syn::Token![=]) {
                    let expr: Expr = meta.value()?.parse()?;
                    default = Some(DefaultValue::Expr(expr));
                } else {
                    default = Some(DefaultValue::Literal(String::new()));
                }
            } else if meta.path.is_ident("hide") {
                hidden = if meta.input.peek(syn::Token![=]) {
                    let lit: Lit = meta.value()?.parse()?;
                    matches!(lit, Lit::Bool(b) if b.value)
                } else {
                    true
                };
            } else {
                skip_value(&meta)?;
            }
            Ok(())
        })?;
    }

    Ok(ArgMeta {
        cli_arg: format!("--{}", long_name.unwrap_or_else(|| field_name.replace('_', "-"))),
        default,
        hidden,
    })
}

fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    match ty {
        Type::Path(type_path) => type_path.path.segments.last(),
        _ => None,
    }
}

fn infer_field_type(ty: &Type) -> proc_macro2::TokenStream {
    if let Some(segment) = last_segment(ty) {
        if segment.ident == "Option" {
            if let PathArguments::AngleBracketed(args) = &segment.arguments {
                if let Some(GenericArgument::Type(inner)) = args.args.first() {
                    return infer_field_type(inner);
                }
            }
        }
        return match segment.ident.to_string().as_str() {
            "PathBuf" => quote! { dockflow_sdk::FieldType::FilePath { pattern: None } },
            "usize" | "u32" | "u64" | "i32" | "i64" => {
                quote! { dockflow_sdk::FieldType::Number { min: None, max: None } }
            }
            "f32" | "f64" => quote! { dockflow_sdk::FieldType::Float },
            _ => quote! { dockflow_sdk::FieldType::Text },
        };
    }

    quote! { dockflow_sdk::FieldType::Text }
}

fn is_option_type(ty: &Type) -> bool {
    last_segment(ty).is_some_and(|s| s.ident == "Option")
}

fn is_bool_type(ty: &Type) -> bool {
    last_segment(ty).is_some_and(|s| s.ident == "bool")
}
