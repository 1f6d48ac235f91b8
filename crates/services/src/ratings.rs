//! Rating Ledger: one like/dislike per post and originating address.
//!
//! There is no check-then-insert here. The (post, address) unique index is
//! the only arbiter, so concurrent votes from one address resolve to exactly
//! one stored rating and one `Conflict`.

use std::sync::Arc;

use chrono::Utc;
use domains::validation;
use domains::{
    Constraint, DomainError, PostRepository, Rating, RatingRepository, RatingValue, Result,
};
use tracing::{info, warn};
use uuid::Uuid;

pub struct RatingLedger {
    ratings: Arc<dyn RatingRepository>,
    posts: Arc<dyn PostRepository>,
}

impl RatingLedger {
    pub fn new(ratings: Arc<dyn RatingRepository>, posts: Arc<dyn PostRepository>) -> Self {
        Self { ratings, posts }
    }

    /// Records a vote. `value` must be +1 or -1 and `address` a textual IP
    /// address; votes cannot be changed or withdrawn afterwards.
    pub async fn cast_vote(
        &self,
        post_id: Uuid,
        address: &str,
        value: i64,
        user_id: Option<Uuid>,
    ) -> Result<Rating> {
        let value = RatingValue::try_from(value)?;
        let ip_address = validation::ip_address(address)?;
        self.ensure_post(post_id).await?;

        let rating = Rating {
            id: Uuid::now_v7(),
            post_id,
            user_id,
            value,
            created_at: Utc::now(),
            ip_address,
        };
        match self.ratings.insert(rating).await {
            Ok(rating) => {
                info!(%post_id, value = rating.value.as_i64(), "vote recorded");
                Ok(rating)
            }
            Err(e) => {
                if e.is_conflict_on(Constraint::RatingAddress) {
                    warn!(%post_id, %ip_address, "duplicate vote rejected");
                }
                Err(e)
            }
        }
    }

    /// Sum of all vote values; 0 for a post nobody voted on.
    pub async fn score_of(&self, post_id: Uuid) -> Result<i64> {
        self.ensure_post(post_id).await?;
        self.ratings.score_of(post_id).await
    }

    /// The vote already cast from `address`, if any.
    pub async fn vote_of(&self, post_id: Uuid, address: &str) -> Result<Option<Rating>> {
        let ip_address = validation::ip_address(address)?;
        self.ratings.find(post_id, ip_address).await
    }

    async fn ensure_post(&self, post_id: Uuid) -> Result<()> {
        match self.posts.get(post_id).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::not_found("post", post_id)),
        }
    }
}
