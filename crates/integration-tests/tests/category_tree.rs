use domains::tree::verify_forest;
use domains::{CategoryRepository, CategoryUpdate, DomainError, SYSTEM_USER_ID};
use integration_tests::TestApp;

async fn assert_forest(app: &TestApp) {
    verify_forest(&app.store.categories().all().await.unwrap()).unwrap();
}

fn move_to(title: &str, parent_id: Option<uuid::Uuid>) -> CategoryUpdate {
    CategoryUpdate {
        title: title.into(),
        parent_id,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_reparenting_keeps_the_forest_acyclic() {
    let app = TestApp::new().await;
    let tech = app.category("Tech", None).await;
    let lang = app.category("Languages", Some(tech.id)).await;
    let rust = app.category("Rust", Some(lang.id)).await;
    let art = app.category("Art", None).await;
    assert_forest(&app).await;

    // A node under itself or under its own descendant is refused.
    for target in [lang.id, rust.id] {
        let err = app
            .categories
            .update(lang.id, move_to("Languages", Some(target)))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "parent_id", .. }));
    }
    assert_forest(&app).await;

    // Moving the whole subtree is fine.
    app.categories
        .update(lang.id, move_to("Languages", Some(art.id)))
        .await
        .unwrap();
    let under_art: Vec<_> = app
        .categories
        .descendants_of(art.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.title)
        .collect();
    assert_eq!(under_art, ["Languages", "Rust"]);
    assert_eq!(
        app.categories.ancestors_of(rust.id).await.unwrap()[0].id,
        art.id
    );
    assert_forest(&app).await;

    // Back to the top level.
    app.categories
        .update(lang.id, move_to("Languages", None))
        .await
        .unwrap();
    let roots: Vec<_> = app
        .categories
        .roots()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.title)
        .collect();
    assert_eq!(roots, ["Art", "Languages", "Tech"]);
    assert_forest(&app).await;
}

#[tokio::test]
async fn test_forest_view_nests_children_in_title_order() {
    let app = TestApp::new().await;
    let tech = app.category("Tech", None).await;
    app.category("web", Some(tech.id)).await;
    app.category("Databases", Some(tech.id)).await;
    app.category("Books", None).await;

    let forest = app.categories.forest().await.unwrap();
    assert_eq!(forest.len(), 2);
    assert_eq!(forest[0].item.title, "Books");
    let children: Vec<_> = forest[1].children.iter().map(|n| n.item.title.as_str()).collect();
    assert_eq!(children, ["Databases", "web"]);
}

#[tokio::test]
async fn test_deleting_a_category_in_use_changes_nothing() {
    let app = TestApp::new().await;
    let tech = app.category("Tech", None).await;
    let lang = app.category("Languages", Some(tech.id)).await;
    let rust = app.category("Rust", Some(lang.id)).await;
    app.post(SYSTEM_USER_ID, "Ownership", rust.id).await;

    let before = app.count("categories").await;
    for id in [tech.id, lang.id, rust.id] {
        let err = app.categories.delete(id).await.unwrap_err();
        assert!(matches!(err, DomainError::Referential(_)), "{err:?}");
    }
    assert_eq!(app.count("categories").await, before);
    assert_eq!(app.count("posts").await, 1);
    assert_forest(&app).await;
}

#[tokio::test]
async fn test_deleting_an_unused_category_removes_its_subtree() {
    let app = TestApp::new().await;
    let tech = app.category("Tech", None).await;
    let lang = app.category("Languages", Some(tech.id)).await;
    app.category("Rust", Some(lang.id)).await;
    let hardware = app.category("Hardware", Some(tech.id)).await;
    app.post(SYSTEM_USER_ID, "Soldering", hardware.id).await;

    assert_eq!(app.categories.delete(lang.id).await.unwrap(), 2);
    let left: Vec<_> = app
        .categories
        .descendants_of(tech.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.title)
        .collect();
    assert_eq!(left, ["Hardware"]);
    assert_forest(&app).await;
}
