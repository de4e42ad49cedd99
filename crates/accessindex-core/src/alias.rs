//! Stable column aliases for composed queries.
//!
//! Every generated column is named after its logical path in the category
//! tree (`sub/topic/criterion` for a criterion score, `t/sub/topic` for a
//! topic score, `sc/sub` for the sub-category score) so a result row can be
//! read back unambiguously and inspected by hand.
//!
//! Aliases are a pure function of the logical path. When the full path would
//! exceed the database identifier limit it is truncated and suffixed with a
//! digest of the untruncated path, so two distinct paths can never collide
//! on the truncated form. The registry builder additionally verifies global
//! uniqueness and treats any collision as fatal.

use sha2::{Digest, Sha256};

use crate::category::{CriterionId, SubCategoryId, TopicId};

/// Identifier length limit of the target database, in bytes.
pub const MAX_IDENT_BYTES: usize = 63;

const DIGEST_CHARS: usize = 8;

/// Alias of a criterion's score column.
pub fn criterion_score(
  sub: &SubCategoryId,
  topic: &TopicId,
  criterion: &CriterionId,
) -> String {
  fit(format!("{sub}/{topic}/{criterion}"))
}

/// Alias of a criterion's data-quality column.
pub fn criterion_quality(
  sub: &SubCategoryId,
  topic: &TopicId,
  criterion: &CriterionId,
) -> String {
  fit(format!("{sub}/{topic}/{criterion}/dqf"))
}

/// Alias of a topic's score column.
pub fn topic_score(sub: &SubCategoryId, topic: &TopicId) -> String {
  fit(format!("t/{sub}/{topic}"))
}

/// Alias of the sub-category score column.
pub fn sub_category_score(sub: &SubCategoryId) -> String {
  fit(format!("sc/{sub}"))
}

/// Alias of the sub-category matched-row-count column.
pub fn sub_category_rows(sub: &SubCategoryId) -> String {
  fit(format!("sc/{sub}/rows"))
}

/// Truncate `path` to the identifier limit, keeping it injective: the
/// truncated head is joined with a digest of the full path by a `~`, which
/// also makes truncated aliases visually distinct from untruncated ones.
fn fit(path: String) -> String {
  if path.len() <= MAX_IDENT_BYTES {
    return path;
  }

  let digest = Sha256::digest(path.as_bytes());
  let digest = &hex::encode(digest)[..DIGEST_CHARS];

  let mut end = MAX_IDENT_BYTES - DIGEST_CHARS - 1;
  while !path.is_char_boundary(end) {
    end -= 1;
  }

  format!("{}~{digest}", &path[..end])
}
