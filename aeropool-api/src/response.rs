use aeropool_domain::search::Pagination;
use axum::Json;
use serde::Serialize;

/// The uniform success envelope: `{success, data, pagination?, message?}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data: Some(data), pagination: None, message: None })
}

pub fn ok_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data: Some(data),
        pagination: None,
        message: Some(message.into()),
    })
}

pub fn ok_paginated<T: Serialize>(data: T, pagination: Pagination) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data: Some(data), pagination: Some(pagination), message: None })
}

pub fn ok_message(message: impl Into<String>) -> Json<ApiResponse<()>> {
    Json(ApiResponse { success: true, data: None, pagination: None, message: Some(message.into()) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let json = serde_json::to_value(&ok(serde_json::json!({"a": 1})).0).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["a"], 1);
        assert!(json.get("pagination").is_none());
    }
}
