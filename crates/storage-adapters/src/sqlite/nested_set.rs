//! Boundary arithmetic for the nested-set tables.
//!
//! Every mutation follows the same steps inside the caller's transaction:
//!
//! 1. park the subtree in tree 0, rebased so its root sits at `lft = 1`,
//!    `level = 0`;
//! 2. close the gap it left behind;
//! 3. (caller) compute the placement from the remaining siblings;
//! 4. open a gap of the subtree's width at the target;
//! 5. relocate the parked rows into it.
//!
//! Lower boundaries are always shifted after upper ones when growing and
//! before them when shrinking, so `CHECK (lft < rght)` holds after every
//! statement.

use domains::{Placement, Result, TreePosition};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::storage_err;

/// Tree id holding the subtree that is being moved.
const PARKED: i64 = 0;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Forest {
    table: &'static str,
}

pub(crate) const CATEGORIES: Forest = Forest { table: "categories" };
pub(crate) const COMMENTS: Forest = Forest { table: "comments" };

impl Forest {
    /// The forest stored in `table`, if it is one.
    pub(crate) fn of(table: &str) -> Option<Forest> {
        [CATEGORIES, COMMENTS].into_iter().find(|f| f.table == table)
    }

    pub(crate) async fn position(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
    ) -> Result<Option<TreePosition>> {
        let sql = format!("SELECT tree_id, lft, rght, level FROM {} WHERE id = ?", self.table);
        let row: Option<(i64, i64, i64, i64)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage_err)?;
        Ok(row.map(|(tree_id, lft, rght, level)| TreePosition {
            tree_id,
            lft,
            rght,
            level,
        }))
    }

    /// Position a freshly inserted, unattached row must be written with.
    pub(crate) fn parked_leaf() -> TreePosition {
        TreePosition::root(PARKED)
    }

    /// Detaches the subtree at `pos` into the parking tree and closes the
    /// gap. Returns the parked root position.
    pub(crate) async fn park(
        &self,
        conn: &mut SqliteConnection,
        pos: TreePosition,
    ) -> Result<TreePosition> {
        let sql = format!(
            "UPDATE {} SET tree_id = ?1, lft = lft - ?2, rght = rght - ?2, level = level - ?3 \
             WHERE tree_id = ?4 AND lft BETWEEN ?5 AND ?6",
            self.table
        );
        sqlx::query(&sql)
            .bind(PARKED)
            .bind(pos.lft - 1)
            .bind(pos.level)
            .bind(pos.tree_id)
            .bind(pos.lft)
            .bind(pos.rght)
            .execute(&mut *conn)
            .await
            .map_err(storage_err)?;
        self.close_gap(conn, pos.tree_id, pos.rght, pos.width()).await?;

        Ok(TreePosition {
            tree_id: PARKED,
            lft: 1,
            rght: pos.width(),
            level: 0,
        })
    }

    /// Moves the parked subtree to `placement`. Positions inside the
    /// placement must have been read after parking.
    pub(crate) async fn attach(
        &self,
        conn: &mut SqliteConnection,
        parked: TreePosition,
        placement: Placement,
    ) -> Result<()> {
        let width = parked.width();
        match placement {
            Placement::Before(sibling) => {
                self.open_gap(conn, sibling.tree_id, sibling.lft, width).await?;
                self.relocate(conn, sibling.tree_id, sibling.lft - 1, sibling.level)
                    .await
            }
            Placement::LastChildOf(parent) => {
                self.open_gap(conn, parent.tree_id, parent.rght, width).await?;
                self.relocate(conn, parent.tree_id, parent.rght - 1, parent.level + 1)
                    .await
            }
            Placement::RootBefore(tree_id) => {
                let sql = format!(
                    "UPDATE {} SET tree_id = tree_id + 1 WHERE tree_id >= ?",
                    self.table
                );
                sqlx::query(&sql)
                    .bind(tree_id)
                    .execute(&mut *conn)
                    .await
                    .map_err(storage_err)?;
                self.relocate(conn, tree_id, 0, 0).await
            }
            Placement::RootLast => {
                let sql = format!("SELECT COALESCE(MAX(tree_id), 0) + 1 FROM {}", self.table);
                let tree_id: i64 = sqlx::query_scalar(&sql)
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(storage_err)?;
                self.relocate(conn, tree_id, 0, 0).await
            }
        }
    }

    /// Deletes the subtree at `pos` and closes the gap. Returns the number
    /// of removed rows.
    pub(crate) async fn remove(&self, conn: &mut SqliteConnection, pos: TreePosition) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE tree_id = ? AND lft BETWEEN ? AND ?",
            self.table
        );
        let removed = sqlx::query(&sql)
            .bind(pos.tree_id)
            .bind(pos.lft)
            .bind(pos.rght)
            .execute(&mut *conn)
            .await
            .map_err(storage_err)?
            .rows_affected();
        self.close_gap(conn, pos.tree_id, pos.rght, pos.width()).await?;
        Ok(removed)
    }

    async fn close_gap(
        &self,
        conn: &mut SqliteConnection,
        tree_id: i64,
        after: i64,
        width: i64,
    ) -> Result<()> {
        for column in ["lft", "rght"] {
            let sql = format!(
                "UPDATE {table} SET {column} = {column} - ?1 WHERE tree_id = ?2 AND {column} > ?3",
                table = self.table
            );
            sqlx::query(&sql)
                .bind(width)
                .bind(tree_id)
                .bind(after)
                .execute(&mut *conn)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    async fn open_gap(
        &self,
        conn: &mut SqliteConnection,
        tree_id: i64,
        at: i64,
        width: i64,
    ) -> Result<()> {
        for column in ["rght", "lft"] {
            let sql = format!(
                "UPDATE {table} SET {column} = {column} + ?1 WHERE tree_id = ?2 AND {column} >= ?3",
                table = self.table
            );
            sqlx::query(&sql)
                .bind(width)
                .bind(tree_id)
                .bind(at)
                .execute(&mut *conn)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    async fn relocate(
        &self,
        conn: &mut SqliteConnection,
        tree_id: i64,
        offset: i64,
        level: i64,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET tree_id = ?1, lft = lft + ?2, rght = rght + ?2, level = level + ?3 \
             WHERE tree_id = ?4",
            self.table
        );
        sqlx::query(&sql)
            .bind(tree_id)
            .bind(offset)
            .bind(level)
            .bind(PARKED)
            .execute(&mut *conn)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}
