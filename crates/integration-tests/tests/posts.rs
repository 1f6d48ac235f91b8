use domains::{DomainError, NewPost, PublicationStatus, SYSTEM_USER_ID};
use integration_tests::{TestApp, PAGE_SIZE};
use services::PostQuery;

fn titles(views: &[domains::PostView]) -> Vec<&str> {
    views.iter().map(|v| v.post.title.as_str()).collect()
}

#[tokio::test]
async fn test_public_listing_excludes_drafts_and_pins_first() {
    let app = TestApp::new().await;
    let cat = app.category("General", None).await;
    app.post_with(SYSTEM_USER_ID, "Old pinned", cat.id, PublicationStatus::Published, true)
        .await;
    app.post(SYSTEM_USER_ID, "Older", cat.id).await;
    app.post_with(SYSTEM_USER_ID, "Unfinished", cat.id, PublicationStatus::Draft, false)
        .await;
    app.post(SYSTEM_USER_ID, "Newest", cat.id).await;

    let listed = app.posts.list_published(PostQuery::default()).await.unwrap();
    assert_eq!(titles(&listed), ["Old pinned", "Newest", "Older"]);
    assert!(listed.iter().all(|v| v.post.status == PublicationStatus::Published));
    assert_eq!(listed[0].author.username, "system");
    assert_eq!(listed[0].category.slug, "general");
}

#[tokio::test]
async fn test_drafts_have_no_public_page() {
    let app = TestApp::new().await;
    let cat = app.category("General", None).await;
    let draft = app
        .post_with(SYSTEM_USER_ID, "Unfinished", cat.id, PublicationStatus::Draft, false)
        .await;

    let err = app.posts.get_published(&draft.slug).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound { entity: "post", .. }));
    // Still reachable for editing.
    assert_eq!(app.posts.get_by_slug(&draft.slug).await.unwrap().id, draft.id);

    let live = app.post(SYSTEM_USER_ID, "Live", cat.id).await;
    let detail = app.posts.get_published(&live.slug).await.unwrap();
    assert_eq!(detail.score, 0);
    assert_eq!(detail.thumbnail_url, "/media/default.jpg");
}

#[tokio::test]
async fn test_category_filter_covers_descendants_and_tags_filter() {
    let app = TestApp::new().await;
    let tech = app.category("Tech", None).await;
    let rust = app.category("Rust", Some(tech.id)).await;
    let art = app.category("Art", None).await;

    app.post(SYSTEM_USER_ID, "Tech news", tech.id).await;
    app.post(SYSTEM_USER_ID, "Borrowing", rust.id).await;
    app.post(SYSTEM_USER_ID, "Painting", art.id).await;
    app.posts
        .create(
            SYSTEM_USER_ID,
            NewPost {
                title: "Lifetimes".into(),
                description: "d".into(),
                text: "t".into(),
                category_id: rust.id,
                tags: vec![" rust ".into(), "memory".into(), "rust".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let in_tech = app
        .posts
        .list_published(PostQuery {
            category: Some("tech".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(titles(&in_tech), ["Lifetimes", "Borrowing", "Tech news"]);

    let tagged = app
        .posts
        .list_published(PostQuery {
            tag: Some("memory".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(titles(&tagged), ["Lifetimes"]);
    assert_eq!(tagged[0].post.tags, ["rust", "memory"]);

    let err = app
        .posts
        .list_published(PostQuery {
            category: Some("missing".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { entity: "category", .. }));
}

#[tokio::test]
async fn test_listing_is_paginated() {
    let app = TestApp::new().await;
    let cat = app.category("General", None).await;
    for i in 0..(PAGE_SIZE + 2) {
        app.post(SYSTEM_USER_ID, &format!("Post {i}"), cat.id).await;
    }

    let page = |page| PostQuery {
        page,
        ..Default::default()
    };
    let first = app.posts.list_published(page(1)).await.unwrap();
    let second = app.posts.list_published(page(2)).await.unwrap();
    let third = app.posts.list_published(page(3)).await.unwrap();
    assert_eq!(first.len(), PAGE_SIZE as usize);
    assert_eq!(second.len(), 2);
    assert!(third.is_empty());
    assert_eq!(second[1].post.title, "Post 0");
}

#[tokio::test]
async fn test_unknown_category_is_a_field_error() {
    let app = TestApp::new().await;
    let err = app
        .posts
        .create(
            SYSTEM_USER_ID,
            NewPost {
                title: "Orphan".into(),
                description: "d".into(),
                category_id: uuid::Uuid::now_v7(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation { field: "category", .. }));
}

#[tokio::test]
async fn test_deleting_a_post_takes_comments_and_votes_along() {
    let app = TestApp::new().await;
    let cat = app.category("General", None).await;
    let post = app.post(SYSTEM_USER_ID, "Doomed", cat.id).await;
    let keep = app.post(SYSTEM_USER_ID, "Survivor", cat.id).await;

    let top = app.comment(SYSTEM_USER_ID, post.id, None, "first").await;
    app.comment(SYSTEM_USER_ID, post.id, Some(top.id), "reply").await;
    app.comment(SYSTEM_USER_ID, keep.id, None, "elsewhere").await;
    app.ratings.cast_vote(post.id, "1.2.3.4", 1, None).await.unwrap();
    app.ratings.cast_vote(post.id, "5.6.7.8", -1, None).await.unwrap();
    app.ratings.cast_vote(keep.id, "1.2.3.4", 1, None).await.unwrap();

    app.posts.delete(post.id).await.unwrap();

    assert!(matches!(
        app.posts.get(post.id).await.unwrap_err(),
        DomainError::NotFound { .. }
    ));
    assert_eq!(app.count("comments").await, 1);
    assert_eq!(app.count("ratings").await, 1);
    assert_eq!(app.categories.get(cat.id).await.unwrap().id, cat.id);
    assert_eq!(app.ratings.score_of(keep.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_thread_is_newest_first_and_hides_draft_subtrees() {
    let app = TestApp::new().await;
    let cat = app.category("General", None).await;
    let post = app.post(SYSTEM_USER_ID, "Talk", cat.id).await;

    let older = app.comment(SYSTEM_USER_ID, post.id, None, "older").await;
    let newer = app.comment(SYSTEM_USER_ID, post.id, None, "newer").await;
    app.comment(SYSTEM_USER_ID, post.id, Some(older.id), "reply").await;
    app.comment(SYSTEM_USER_ID, post.id, Some(newer.id), "hidden reply")
        .await;

    let thread: Vec<_> = app
        .comments
        .thread(post.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.content)
        .collect();
    assert_eq!(thread, ["newer", "hidden reply", "older", "reply"]);

    app.comments
        .edit(newer.id, "newer".into(), PublicationStatus::Draft)
        .await
        .unwrap();
    let tree = app.comments.thread_tree(post.id).await.unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].item.content, "older");
    assert_eq!(tree[0].children[0].item.content, "reply");
}
