//! Assembly of the nested catalog representations returned by the API, plus the
//! ordering whitelists of every catalog listing.

use std::collections::HashMap;

use crate::{
    error::AppResult,
    models::{
        Course, CourseCategory, CourseComment, CourseLesson, CourseType, CourseView, CommentView,
        LessonTopic, LessonView, TaxonomyKind, TopicView,
    },
    pagination::{OrderBy, OrderingSpec},
    repository::RepositoryState,
    storage::StorageService,
};

// --- Ordering whitelists ---

pub const CATEGORY_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[("category_name", "name"), ("id", "id")],
    default: &[OrderBy {
        field: "name",
        descending: false,
    }],
};

pub const COURSE_TYPE_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[("course_name", "name"), ("id", "id")],
    default: &[OrderBy {
        field: "name",
        descending: false,
    }],
};

pub const COURSE_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[
        ("course_title", "course_title"),
        ("created_at", "created_at"),
        ("id", "id"),
    ],
    default: &[OrderBy {
        field: "course_title",
        descending: false,
    }],
};

pub const LESSON_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[
        ("lesson_title", "lesson_title"),
        ("lesson_order", "lesson_order"),
        ("id", "id"),
    ],
    default: &[OrderBy {
        field: "lesson_order",
        descending: false,
    }],
};

pub const TOPIC_TYPE_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[("type_name", "type_name"), ("id", "id")],
    default: &[OrderBy {
        field: "type_name",
        descending: false,
    }],
};

pub const TOPIC_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[
        ("topic_title", "topic_title"),
        ("topic_order", "topic_order"),
        ("id", "id"),
    ],
    default: &[OrderBy {
        field: "topic_order",
        descending: false,
    }],
};

pub const COMMENT_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[("created_at", "created_at")],
    default: &[OrderBy {
        field: "created_at",
        descending: true,
    }],
};

pub const RATING_ORDERING: OrderingSpec = OrderingSpec {
    fields: &[("created_at", "created_at"), ("rating", "rating")],
    default: &[OrderBy {
        field: "created_at",
        descending: true,
    }],
};

// --- Nested views ---

fn dedup<T: Copy + PartialEq>(ids: impl Iterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// course_views
///
/// Nests category and type into each course (one batch query per table) and
/// turns the banner key into a public URL. Input order is preserved.
pub async fn course_views(
    repo: &RepositoryState,
    storage: &dyn StorageService,
    courses: Vec<Course>,
) -> AppResult<Vec<CourseView>> {
    let category_ids = dedup(courses.iter().map(|c| c.course_category_id));
    let type_ids = dedup(courses.iter().map(|c| c.course_type_id));

    let categories: HashMap<i64, CourseCategory> = repo
        .get_terms_by_ids(TaxonomyKind::Category, &category_ids)
        .await?
        .into_iter()
        .map(|term| (term.id, CourseCategory::from(term)))
        .collect();
    let course_types: HashMap<i64, CourseType> = repo
        .get_terms_by_ids(TaxonomyKind::CourseType, &type_ids)
        .await?
        .into_iter()
        .map(|term| (term.id, CourseType::from(term)))
        .collect();

    Ok(courses
        .into_iter()
        .map(|course| CourseView {
            id: course.id,
            course_category: categories
                .get(&course.course_category_id)
                .cloned()
                .unwrap_or_default(),
            course_type: course_types
                .get(&course.course_type_id)
                .cloned()
                .unwrap_or_default(),
            course_title: course.course_title,
            course_slug: course.course_slug,
            course_description: course.course_description,
            course_banner: course.course_banner.as_deref().map(|key| storage.public_url(key)),
            course_views: course.course_views,
            is_free_course: course.is_free_course,
            course_price: course.course_price,
            is_published: course.is_published,
            created_at: course.created_at,
            updated_at: course.updated_at,
            is_active: course.is_active,
        })
        .collect())
}

pub async fn course_view(
    repo: &RepositoryState,
    storage: &dyn StorageService,
    course: Course,
) -> AppResult<CourseView> {
    Ok(course_views(repo, storage, vec![course])
        .await?
        .into_iter()
        .next()
        .unwrap_or_default())
}

pub async fn lesson_views(
    repo: &RepositoryState,
    storage: &dyn StorageService,
    lessons: Vec<CourseLesson>,
) -> AppResult<Vec<LessonView>> {
    let course_ids = dedup(lessons.iter().map(|l| l.course_id));
    let courses = repo.get_courses_by_ids(&course_ids).await?;
    let courses: HashMap<i64, CourseView> = course_views(repo, storage, courses)
        .await?
        .into_iter()
        .map(|view| (view.id, view))
        .collect();

    Ok(lessons
        .into_iter()
        .map(|lesson| LessonView {
            id: lesson.id,
            course: courses.get(&lesson.course_id).cloned().unwrap_or_default(),
            lesson_title: lesson.lesson_title,
            lesson_slug: lesson.lesson_slug,
            lesson_description: lesson.lesson_description,
            lesson_order: lesson.lesson_order,
            created_at: lesson.created_at,
            is_active: lesson.is_active,
        })
        .collect())
}

pub async fn lesson_view(
    repo: &RepositoryState,
    storage: &dyn StorageService,
    lesson: CourseLesson,
) -> AppResult<LessonView> {
    Ok(lesson_views(repo, storage, vec![lesson])
        .await?
        .into_iter()
        .next()
        .unwrap_or_default())
}

pub async fn topic_views(
    repo: &RepositoryState,
    storage: &dyn StorageService,
    topics: Vec<LessonTopic>,
) -> AppResult<Vec<TopicView>> {
    let lesson_ids = dedup(topics.iter().map(|t| t.lesson_id));
    let type_ids = dedup(topics.iter().map(|t| t.type_id));

    let lessons = repo.get_lessons_by_ids(&lesson_ids).await?;
    let lessons: HashMap<i64, LessonView> = lesson_views(repo, storage, lessons)
        .await?
        .into_iter()
        .map(|view| (view.id, view))
        .collect();
    let types: HashMap<i64, _> = repo
        .get_topic_types_by_ids(&type_ids)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    Ok(topics
        .into_iter()
        .map(|topic| TopicView {
            id: topic.id,
            lesson: lessons.get(&topic.lesson_id).cloned().unwrap_or_default(),
            topic_type: types.get(&topic.type_id).cloned().unwrap_or_default(),
            topic_order: topic.topic_order,
            topic_title: topic.topic_title,
            topic_slug: topic.topic_slug,
            topic_content: topic.topic_content,
            created_at: topic.created_at,
            is_active: topic.is_active,
        })
        .collect())
}

pub async fn topic_view(
    repo: &RepositoryState,
    storage: &dyn StorageService,
    topic: LessonTopic,
) -> AppResult<TopicView> {
    Ok(topic_views(repo, storage, vec![topic])
        .await?
        .into_iter()
        .next()
        .unwrap_or_default())
}

// --- Comment threads ---

/// Replies below this depth are left out of rendered threads.
pub const MAX_THREAD_DEPTH: usize = 32;

/// comment_threads
///
/// Hangs `replies` (oldest first) under their `roots`, down to `MAX_THREAD_DEPTH`.
/// Replies whose parent is not reachable from a root are dropped.
pub fn comment_threads(
    storage: &dyn StorageService,
    roots: Vec<CourseComment>,
    replies: Vec<CourseComment>,
) -> Vec<CommentView> {
    let mut children: HashMap<i64, Vec<CourseComment>> = HashMap::new();
    for reply in replies {
        if let Some(parent) = reply.parent_id {
            children.entry(parent).or_default().push(reply);
        }
    }

    roots
        .into_iter()
        .map(|root| build_thread(storage, root, &mut children, 0))
        .collect()
}

fn build_thread(
    storage: &dyn StorageService,
    comment: CourseComment,
    children: &mut HashMap<i64, Vec<CourseComment>>,
    depth: usize,
) -> CommentView {
    let replies = if depth < MAX_THREAD_DEPTH {
        children
            .remove(&comment.id)
            .unwrap_or_default()
            .into_iter()
            .map(|reply| build_thread(storage, reply, children, depth + 1))
            .collect()
    } else {
        Vec::new()
    };

    CommentView {
        id: comment.id,
        course: comment.course_id,
        username: comment.username,
        avatar: comment.avatar.as_deref().map(|key| storage.public_url(key)),
        content: comment.content,
        created_at: comment.created_at,
        parent: comment.parent_id,
        replies,
    }
}

/// A single comment with its own subtree, taken from the course's replies.
pub fn comment_thread(
    storage: &dyn StorageService,
    comment: CourseComment,
    replies: Vec<CourseComment>,
) -> CommentView {
    comment_threads(storage, vec![comment], replies)
        .into_iter()
        .next()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockStorageService;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn comment(id: i64, parent: Option<i64>, minutes: i64) -> CourseComment {
        CourseComment {
            id,
            course_id: 1,
            user_id: Uuid::nil(),
            parent_id: parent,
            content: format!("c{id}"),
            created_at: Utc::now() + Duration::minutes(minutes),
            username: "u".into(),
            avatar: Some("avatars/u/a.png".into()),
        }
    }

    #[test]
    fn threads_nest_replies_recursively() {
        let storage = MockStorageService::new();
        let roots = vec![comment(1, None, 10), comment(2, None, 5)];
        let replies = vec![comment(3, Some(1), 11), comment(4, Some(3), 12), comment(5, Some(1), 13)];

        let threads = comment_threads(&storage, roots, replies);

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].replies.len(), 2);
        assert_eq!(threads[0].replies[0].id, 3);
        assert_eq!(threads[0].replies[0].replies[0].id, 4);
        assert!(threads[1].replies.is_empty());
        assert_eq!(
            threads[0].avatar.as_deref(),
            Some("http://localhost:9000/mock-bucket/avatars/u/a.png")
        );
    }

    #[test]
    fn single_thread_only_takes_its_subtree() {
        let storage = MockStorageService::new();
        let replies = vec![comment(3, Some(1), 11), comment(6, Some(2), 12)];
        let thread = comment_thread(&storage, comment(1, None, 10), replies);
        assert_eq!(thread.replies.len(), 1);
        assert_eq!(thread.replies[0].id, 3);
    }

    #[test]
    fn deep_reply_chains_are_cut_off() {
        let storage = MockStorageService::new();
        let replies: Vec<_> = (2..5_000).map(|id| comment(id, Some(id - 1), 0)).collect();

        let thread = comment_thread(&storage, comment(1, None, 0), replies);
        serde_json::to_string(&thread).unwrap();

        let mut depth = 0;
        let mut node = &thread;
        while let Some(child) = node.replies.first() {
            depth += 1;
            node = child;
        }
        assert_eq!(depth, MAX_THREAD_DEPTH);
    }
}
