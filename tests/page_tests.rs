const INDEX_PAGE: &str = include_str!("../demos/index.html");

#[test]
fn page_previews_the_selected_image() {
    assert!(INDEX_PAGE.contains(r#"id="preview-image""#));
    assert!(INDEX_PAGE.contains(r#"id="preview-caption""#));
    assert!(INDEX_PAGE.contains("URL.createObjectURL(file)"));
    assert!(INDEX_PAGE.contains(r#"imageInput.addEventListener("change""#));
}

#[test]
fn page_accepts_only_jpeg_and_png() {
    assert!(INDEX_PAGE.contains(r#"accept="image/jpeg,image/png""#));
    assert!(INDEX_PAGE.contains(r#"type="password" name="api_key""#));
}
