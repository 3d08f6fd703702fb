//! Mutation policy registry.

pub mod body_replace;
pub mod https_to_http;
pub mod json_default_value;
pub mod json_get_param;
pub mod null_mutate;
pub mod ssl_protocol;
pub mod xml_doctype;
pub mod xml_params;

use crate::chain::MutatorFactory;

/// Every policy, in chain order.
pub fn all() -> Vec<Box<dyn MutatorFactory>> {
    vec![
        Box::new(https_to_http::HttpsToHttp),
        Box::new(json_default_value::JsonChangeDefaultValue),
        Box::new(json_get_param::JsonChangeGetParam),
        Box::new(xml_doctype::XmlEnabledDoctypeParsing),
        Box::new(xml_params::XmlChangeGetAttributeValueParam),
        Box::new(xml_params::XmlRemoveRequire),
        Box::new(ssl_protocol::VulnerableSslContextProtocol),
        Box::new(body_replace::AlwaysTrueHostnameVerifier),
        Box::new(body_replace::EmptyTrustManager),
        Box::new(null_mutate::NullMutateEverything),
    ]
}

/// Policies used when none are named explicitly.
pub fn defaults() -> Vec<Box<dyn MutatorFactory>> {
    all()
        .into_iter()
        .filter(|f| f.name() != "null_mutate")
        .collect()
}

pub fn names() -> Vec<&'static str> {
    all().iter().map(|f| f.name()).collect()
}

/// Policies selected by name, kept in chain order.
pub fn by_names(requested: &[String]) -> Result<Vec<Box<dyn MutatorFactory>>, String> {
    let known = names();
    if let Some(unknown) = requested.iter().find(|r| !known.contains(&r.as_str())) {
        return Err(unknown.clone());
    }
    Ok(all()
        .into_iter()
        .filter(|f| requested.iter().any(|r| r == f.name()))
        .collect())
}
