use authmatrix::spec::SpecStore;
use authmatrix::{AuthMatrixError, Result};

#[test]
fn test_format_error() {
    let err = AuthMatrixError::FormatError("missing roles".to_string());
    assert_eq!(err.to_string(), "格式错误: missing roles");
}

#[test]
fn test_engine_fatal() {
    let err = AuthMatrixError::EngineFatal("bad snapshot".to_string());
    assert_eq!(err.to_string(), "引擎错误: bad snapshot");
}

#[test]
fn test_error_conversion_from_anyhow() {
    let anyhow_err = anyhow::anyhow!("test anyhow error");
    let err: AuthMatrixError = anyhow_err.into();
    assert!(err.to_string().contains("test anyhow error"));
}

#[test]
fn test_error_conversion_from_json() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: AuthMatrixError = json_err.into();
    assert!(err.to_string().starts_with("JSON 解析错误"));
}

#[test]
fn test_result_type() {
    fn returns_error() -> Result<()> {
        Err(AuthMatrixError::validation("unknown role"))
    }

    match returns_error() {
        Err(AuthMatrixError::ValidationError(msg)) => assert_eq!(msg, "unknown role"),
        _ => panic!("Expected ValidationError"),
    }
}

/// 非法修改返回 ValidationError 且不改动模型
#[test]
fn test_store_rejects_invalid_edits() {
    let mut store = SpecStore::new();
    let before = store.snapshot();

    let err = store.delete_endpoint(3).unwrap_err();
    assert!(matches!(err, AuthMatrixError::ValidationError(_)));

    let err = store
        .load_from_content("#!AUTHMATRIX\n{\"roles\": {}}")
        .unwrap_err();
    assert!(matches!(err, AuthMatrixError::FormatError(_)));

    assert_eq!(store.snapshot(), before);
}
