use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use std::collections::HashSet;
use syn::{
    Data, DeriveInput, Fields, GenericArgument, Ident, LitStr, PathArguments, Type, Visibility,
    ext::IdentExt,
};

const ID_KEY: &str = "_id";

struct FieldSpec {
    ident: Ident,
    vis: Visibility,
    ty: Type,
    key: String,
    key_span: Span,
    is_id: bool,
}

pub fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "Record can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "Record can only be derived for structs",
            ));
        }
    };

    let collection = parse_collection(&input)?;
    let specs = fields
        .iter()
        .map(parse_field)
        .collect::<syn::Result<Vec<_>>>()?;
    check_keys(&specs)?;

    let id = specs.iter().find(|spec| spec.is_id);
    let data = specs.iter().filter(|spec| !spec.is_id).collect::<Vec<_>>();

    let name = &input.ident;
    let vis = &input.vis;
    let record_name = name.to_string();
    let fields_ident = format_ident!("{}Fields", name);

    let data_idents = data.iter().map(|spec| &spec.ident).collect::<Vec<_>>();
    let data_vis = data.iter().map(|spec| &spec.vis).collect::<Vec<_>>();
    let data_types = data.iter().map(|spec| &spec.ty).collect::<Vec<_>>();
    let data_keys = data.iter().map(|spec| spec.key.as_str()).collect::<Vec<_>>();
    let data_members = data
        .iter()
        .map(|spec| spec.ident.unraw().to_string())
        .collect::<Vec<_>>();

    let id_path_member = id.map(|spec| {
        let ident = &spec.ident;
        let vis = &spec.vis;
        let id_ty = id_type(spec);
        quote! { #vis #ident: ::docmodel::field::Field<Root, #id_ty>, }
    });
    let id_path_init = id.map(|spec| {
        let ident = &spec.ident;
        quote! {
            #ident: ::docmodel::field::Field::new(::docmodel::field::join_path(prefix, #ID_KEY)),
        }
    });
    let id_registration = id.map(|spec| {
        let id_ty = id_type(spec);
        let member = spec.ident.unraw().to_string();
        quote! { .id::<#id_ty>(#member) }
    });
    let id_encode = id.map(|spec| {
        let ident = &spec.ident;
        quote! { ::docmodel::codec::encode_field(&mut document, #ID_KEY, &self.#ident); }
    });
    let id_decode = id.map(|spec| {
        let ident = &spec.ident;
        quote! { #ident: ::docmodel::codec::decode_field(document, #ID_KEY)?, }
    });

    let model_impl = id.map(|spec| {
        let ident = &spec.ident;
        let id_ty = id_type(spec);
        let collection = match &collection {
            Some(collection) => quote! { ::core::option::Option::Some(#collection) },
            None => quote! { ::core::option::Option::None },
        };
        let (get_id, set_id) = if option_inner(&spec.ty).is_some() {
            (
                quote! { self.#ident.as_ref() },
                quote! { self.#ident = ::core::option::Option::Some(id); },
            )
        } else {
            (
                quote! { ::core::option::Option::Some(&self.#ident) },
                quote! { self.#ident = id; },
            )
        };

        quote! {
            impl ::docmodel::record::Model for #name {
                type Id = #id_ty;

                fn collection_name() -> ::core::option::Option<&'static str> {
                    #collection
                }

                fn id(&self) -> ::core::option::Option<&Self::Id> {
                    #get_id
                }

                fn set_id(&mut self, id: Self::Id) {
                    #set_id
                }
            }
        }
    });

    if id.is_none() {
        if let Some(collection) = &collection {
            return Err(syn::Error::new_spanned(
                collection,
                "a collection requires a field marked #[record(id)]",
            ));
        }
    }

    let fields_doc = format!("Typed field paths of [`{name}`].");

    Ok(quote! {
        #[doc = #fields_doc]
        #vis struct #fields_ident<Root> {
            #id_path_member
            #( #data_vis #data_idents: <#data_types as ::docmodel::value::FieldValue>::Path<Root>, )*
            _root: ::core::marker::PhantomData<fn() -> Root>,
        }

        impl ::docmodel::record::Record for #name {
            type Fields<Root> = #fields_ident<Root>;

            fn schema() -> &'static ::docmodel::field::Schema {
                static SCHEMA: ::std::sync::OnceLock<::docmodel::field::Schema> =
                    ::std::sync::OnceLock::new();

                SCHEMA.get_or_init(|| {
                    match ::docmodel::field::Schema::builder(#record_name)
                        #id_registration
                        #( .field::<#data_types>(#data_members, #data_keys) )*
                        .build()
                    {
                        ::core::result::Result::Ok(schema) => schema,
                        ::core::result::Result::Err(err) => panic!("{}", err),
                    }
                })
            }

            fn fields_at<Root>(prefix: &str) -> Self::Fields<Root> {
                #fields_ident {
                    #id_path_init
                    #(
                        #data_idents: <#data_types as ::docmodel::value::FieldValue>::path_at(
                            ::docmodel::field::join_path(prefix, #data_keys),
                        ),
                    )*
                    _root: ::core::marker::PhantomData,
                }
            }

            fn to_document(&self) -> ::docmodel::bson::Document {
                let mut document = ::docmodel::bson::Document::new();
                #id_encode
                #( ::docmodel::codec::encode_field(&mut document, #data_keys, &self.#data_idents); )*
                document
            }

            fn from_document(
                document: &::docmodel::bson::Document,
            ) -> ::core::result::Result<Self, ::docmodel::error::DeserializeError> {
                ::core::result::Result::Ok(Self {
                    #id_decode
                    #( #data_idents: ::docmodel::codec::decode_field(document, #data_keys)?, )*
                })
            }
        }

        impl ::docmodel::value::FieldValue for #name {
            type Query = Self;
            type Path<Root> = ::docmodel::field::Embedded<Root, Self>;

            fn field_type() -> ::docmodel::field::FieldType {
                ::docmodel::field::FieldType::Embedded(
                    <Self as ::docmodel::record::Record>::schema(),
                )
            }

            fn to_bson(&self) -> ::core::option::Option<::docmodel::bson::Bson> {
                ::docmodel::codec::encode_embedded(self)
            }

            fn from_bson(
                value: ::core::option::Option<&::docmodel::bson::Bson>,
                key: &str,
            ) -> ::core::result::Result<Self, ::docmodel::error::DeserializeError> {
                ::docmodel::codec::decode_embedded(value, key)
            }

            fn path_at<Root>(path: ::std::string::String) -> Self::Path<Root> {
                ::docmodel::field::Embedded::new(path)
            }
        }

        impl ::docmodel::value::Required for #name {}

        #model_impl
    })
}

fn parse_collection(input: &DeriveInput) -> syn::Result<Option<LitStr>> {
    let mut collection = None;

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().is_empty() {
                    return Err(meta.error("collection name cannot be empty"));
                }
                collection = Some(value);
                Ok(())
            } else {
                Err(meta.error("unsupported record attribute, expected `collection = \"...\"`"))
            }
        })?;
    }

    Ok(collection)
}

fn parse_field(field: &syn::Field) -> syn::Result<FieldSpec> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;

    let mut is_id = false;
    let mut rename: Option<LitStr> = None;

    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                is_id = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                rename = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported field attribute, expected `id` or `rename = \"...\"`"))
            }
        })?;
    }

    if is_id {
        if let Some(rename) = &rename {
            return Err(syn::Error::new_spanned(
                rename,
                "the identifier is always stored under `_id`",
            ));
        }
    }

    let (key, key_span) = match &rename {
        Some(rename) => (rename.value(), rename.span()),
        None => (ident.unraw().to_string(), ident.span()),
    };

    Ok(FieldSpec {
        ident,
        vis: field.vis.clone(),
        ty: field.ty.clone(),
        key,
        key_span,
        is_id,
    })
}

fn check_keys(specs: &[FieldSpec]) -> syn::Result<()> {
    let mut errors: Option<syn::Error> = None;
    let mut seen = HashSet::new();
    let mut has_id = false;

    for spec in specs {
        let problem = if spec.is_id {
            let duplicate = has_id;
            has_id = true;
            duplicate.then(|| "only one field can be marked #[record(id)]".to_string())
        } else if spec.key.is_empty() {
            Some("document key cannot be empty".to_string())
        } else if spec.key.contains('.') {
            Some(format!("document key `{}` cannot contain '.'", spec.key))
        } else if spec.key.starts_with('$') {
            Some(format!("document key `{}` cannot start with '$'", spec.key))
        } else if spec.key == ID_KEY {
            Some("`_id` is reserved for the identifier, mark the field with #[record(id)]".to_string())
        } else if !seen.insert(spec.key.as_str()) {
            Some(format!("duplicate document key `{}`", spec.key))
        } else {
            None
        };

        if let Some(message) = problem {
            let err = syn::Error::new(spec.key_span, message);
            match errors.as_mut() {
                Some(existing) => existing.combine(err),
                None => errors = Some(err),
            }
        }
    }

    errors.map_or(Ok(()), Err)
}

fn id_type(spec: &FieldSpec) -> &Type {
    option_inner(&spec.ty).unwrap_or(&spec.ty)
}

fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    if path.qself.is_some() {
        return None;
    }

    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }

    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };

    match args.args.first() {
        Some(GenericArgument::Type(inner)) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}
