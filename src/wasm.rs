use crate::GenerateOptions;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub fn compile_bky_to_yail(source: &str) -> Result<String, JsValue> {
    compile_bky_to_yail_with_options(source, true)
}

#[wasm_bindgen]
pub fn compile_bky_to_yail_with_options(source: &str, warn_orphans: bool) -> Result<String, JsValue> {
    crate::compile_bky_source(source, &GenerateOptions { warn_orphans })
        .map(|generation| generation.render())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Diagnostics for a document as a JSON array string.
#[wasm_bindgen]
pub fn diagnose_bky(source: &str) -> Result<String, JsValue> {
    let generation = crate::compile_bky_source(source, &GenerateOptions::default())
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(crate::diagnostics::diagnostics_to_json(&generation.diagnostics).to_string())
}
