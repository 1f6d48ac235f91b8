//! Threaded comments. Each post owns an independent forest of comments,
//! newest first at every level.

use std::sync::Arc;

use chrono::Utc;
use domains::tree::{build_forest, prune_subtrees};
use domains::validation::{self, COMMENT_MAX};
use domains::{
    Comment, CommentRecord, CommentRepository, DomainError, NewComment, PostRepository,
    PublicationStatus, Result, TreeNode,
};
use tracing::info;
use uuid::Uuid;

pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    posts: Arc<dyn PostRepository>,
}

impl CommentService {
    pub fn new(comments: Arc<dyn CommentRepository>, posts: Arc<dyn PostRepository>) -> Self {
        Self { comments, posts }
    }

    /// Adds a top-level comment or, with `parent_id`, a reply. A reply must
    /// target a comment of the same post.
    pub async fn add(&self, author_id: Uuid, input: NewComment) -> Result<Comment> {
        validate_content(&input.content)?;
        if self.posts.get(input.post_id).await?.is_none() {
            return Err(DomainError::not_found("post", input.post_id));
        }
        if let Some(parent_id) = input.parent_id {
            let parent = self.comments.get(parent_id).await?.ok_or_else(|| {
                DomainError::validation("parent_id", format!("comment {parent_id} does not exist"))
            })?;
            if parent.post_id != input.post_id {
                return Err(DomainError::validation(
                    "parent_id",
                    "a reply must belong to the same post as its parent",
                ));
            }
        }

        let record = CommentRecord {
            id: Uuid::now_v7(),
            post_id: input.post_id,
            author_id,
            content: input.content,
            created_at: Utc::now(),
            status: PublicationStatus::Published,
            parent_id: input.parent_id,
        };
        let comment = self.comments.insert(record).await?;
        info!(comment_id = %comment.id, post_id = %comment.post_id, "comment added");
        Ok(comment)
    }

    pub async fn edit(
        &self,
        id: Uuid,
        content: String,
        status: PublicationStatus,
    ) -> Result<Comment> {
        validate_content(&content)?;
        self.get(id).await?;
        self.comments.update_content(id, content, status, Utc::now()).await
    }

    /// Deletes the comment and all replies below it.
    pub async fn delete(&self, id: Uuid) -> Result<u64> {
        let removed = self.comments.delete(id).await?;
        info!(comment_id = %id, removed, "comment subtree deleted");
        Ok(removed)
    }

    pub async fn get(&self, id: Uuid) -> Result<Comment> {
        self.comments
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("comment", id))
    }

    /// Direct replies, newest first; `None` lists the post's top-level
    /// comments.
    pub async fn children_of(&self, post_id: Uuid, parent: Option<Uuid>) -> Result<Vec<Comment>> {
        self.comments.children_of(post_id, parent).await
    }

    pub async fn descendants_of(&self, id: Uuid) -> Result<Vec<Comment>> {
        self.get(id).await?;
        self.comments.descendants_of(id).await
    }

    /// Public depth-first listing of a post's comments. A draft comment is
    /// hidden together with every reply below it.
    pub async fn thread(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let all = self.comments.thread(post_id).await?;
        Ok(prune_subtrees(all, |c| c.status == PublicationStatus::Published))
    }

    pub async fn thread_tree(&self, post_id: Uuid) -> Result<Vec<TreeNode<Comment>>> {
        Ok(build_forest(self.thread(post_id).await?))
    }
}

fn validate_content(content: &str) -> Result<()> {
    validation::required("content", content)?;
    validation::max_chars("content", content, COMMENT_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockCommentRepository, MockPostRepository, Post, TreePosition};

    fn post(id: Uuid) -> Post {
        let now = Utc::now();
        Post {
            id,
            title: "Hello".into(),
            slug: "hello".into(),
            description: String::new(),
            text: String::new(),
            thumbnail: domains::DEFAULT_THUMBNAIL.into(),
            status: PublicationStatus::Published,
            created_at: now,
            updated_at: now,
            author_id: Uuid::now_v7(),
            updater_id: None,
            fixed: false,
            category_id: Uuid::now_v7(),
            tags: vec![],
        }
    }

    fn comment(post_id: Uuid, status: PublicationStatus, pos: TreePosition) -> Comment {
        let now = Utc::now();
        Comment {
            id: Uuid::now_v7(),
            post_id,
            author_id: Uuid::now_v7(),
            content: "hi".into(),
            created_at: now,
            updated_at: now,
            status,
            parent_id: None,
            position: pos,
        }
    }

    fn from_record(r: CommentRecord) -> Comment {
        Comment {
            id: r.id,
            post_id: r.post_id,
            author_id: r.author_id,
            content: r.content,
            created_at: r.created_at,
            updated_at: r.created_at,
            status: r.status,
            parent_id: r.parent_id,
            position: TreePosition::root(1),
        }
    }

    #[tokio::test]
    async fn test_add_rejects_reply_across_posts() {
        let post_id = Uuid::now_v7();
        let other = comment(Uuid::now_v7(), PublicationStatus::Published, TreePosition::root(1));

        let mut posts = MockPostRepository::new();
        posts.expect_get().returning(move |id| Ok(Some(post(id))));
        let mut comments = MockCommentRepository::new();
        comments.expect_get().returning(move |_| Ok(Some(other.clone())));
        comments.expect_insert().never();

        let service = CommentService::new(Arc::new(comments), Arc::new(posts));
        let err = service
            .add(
                Uuid::now_v7(),
                NewComment {
                    post_id,
                    content: "reply".into(),
                    parent_id: Some(Uuid::now_v7()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "parent_id", .. }));
    }

    #[tokio::test]
    async fn test_add_sets_author_and_timestamps() {
        let post_id = Uuid::now_v7();
        let author = Uuid::now_v7();

        let mut posts = MockPostRepository::new();
        posts.expect_get().returning(move |id| Ok(Some(post(id))));
        let mut comments = MockCommentRepository::new();
        comments
            .expect_insert()
            .withf(move |r| r.author_id == author && r.parent_id.is_none())
            .returning(|r| Ok(from_record(r)));

        let service = CommentService::new(Arc::new(comments), Arc::new(posts));
        let added = service
            .add(
                author,
                NewComment {
                    post_id,
                    content: "first!".into(),
                    parent_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(added.created_at, added.updated_at);
        assert_eq!(added.status, PublicationStatus::Published);
    }

    #[tokio::test]
    async fn test_content_length_is_capped() {
        let service = CommentService::new(
            Arc::new(MockCommentRepository::new()),
            Arc::new(MockPostRepository::new()),
        );
        let err = service
            .add(
                Uuid::now_v7(),
                NewComment {
                    post_id: Uuid::now_v7(),
                    content: "x".repeat(3001),
                    parent_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "content", .. }));
    }

    #[tokio::test]
    async fn test_thread_hides_drafts_with_their_replies() {
        let post_id = Uuid::now_v7();
        // visible(draft(reply))  visible2
        let listing = vec![
            comment(post_id, PublicationStatus::Published, TreePosition { tree_id: 1, lft: 1, rght: 6, level: 0 }),
            comment(post_id, PublicationStatus::Draft, TreePosition { tree_id: 1, lft: 2, rght: 5, level: 1 }),
            comment(post_id, PublicationStatus::Published, TreePosition { tree_id: 1, lft: 3, rght: 4, level: 2 }),
            comment(post_id, PublicationStatus::Published, TreePosition::root(2)),
        ];
        let expected = vec![listing[0].id, listing[3].id];

        let mut comments = MockCommentRepository::new();
        comments.expect_thread().returning(move |_| Ok(listing.clone()));

        let service = CommentService::new(Arc::new(comments), Arc::new(MockPostRepository::new()));
        let visible: Vec<_> = service.thread(post_id).await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(visible, expected);

        let tree = service.thread_tree(post_id).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree[0].children.is_empty());
    }
}
