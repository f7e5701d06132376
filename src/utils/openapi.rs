//! Small builders for the OpenAPI fragments each module contributes.

use serde_json::{json, Value};

pub fn json_response(description: &str, schema: Value) -> Value {
    json!({
        "description": description,
        "content": { "application/json": { "schema": schema } }
    })
}

pub fn text_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": { "text/plain": { "schema": { "type": "string" } } }
    })
}

pub fn error_response(description: &str) -> Value {
    json_response(
        description,
        json!({ "$ref": "#/components/schemas/ErrorResponse" }),
    )
}

pub fn query_param(name: &str, description: &str, kind: &str) -> Value {
    json!({
        "name": name,
        "in": "query",
        "required": true,
        "description": description,
        "schema": { "type": kind }
    })
}

pub fn json_body(description: &str, schema: Value) -> Value {
    json!({
        "required": true,
        "description": description,
        "content": { "application/json": { "schema": schema } }
    })
}

pub fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{name}") })
}

pub fn array_of(items: Value) -> Value {
    json!({ "type": "array", "items": items })
}

/// One operation object. `responses` pairs a status code with its response.
pub fn operation(
    tag: &str,
    summary: &str,
    parameters: Vec<Value>,
    body: Option<Value>,
    responses: Vec<(&str, Value)>,
) -> Value {
    let mut op = json!({
        "summary": summary,
        "tags": [tag],
        "responses": {}
    });

    if !parameters.is_empty() {
        op["parameters"] = Value::Array(parameters);
    }
    if let Some(body) = body {
        op["requestBody"] = body;
    }
    for (status, response) in responses {
        op["responses"][status] = response;
    }
    op
}
