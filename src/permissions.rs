use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{AuthorDetails, Course},
};

/// Visibility
///
/// Which catalog rows a listing may return for the current viewer. Applied by
/// the repositories to courses and everything hanging off them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Published and active rows only.
    Public,
    /// Public rows plus rows created by this user.
    PublicOr(Uuid),
    /// Everything, including unpublished and inactive rows.
    Everything,
    /// Only rows created by this user, regardless of publication.
    OwnedBy(Uuid),
}

impl Visibility {
    pub fn for_viewer(viewer: Option<&AuthUser>) -> Self {
        match viewer {
            None => Visibility::Public,
            Some(user) if user.is_superuser => Visibility::Everything,
            Some(user) => Visibility::PublicOr(user.id),
        }
    }

    /// The same rule, evaluated against a single course in memory.
    pub fn allows(&self, course: &Course) -> bool {
        let public = course.is_published && course.is_active;
        match self {
            Visibility::Public => public,
            Visibility::PublicOr(user_id) => public || course.created_by == *user_id,
            Visibility::Everything => true,
            Visibility::OwnedBy(user_id) => course.created_by == *user_id,
        }
    }
}

/// can_manage
///
/// Row-level ownership: the creator or a superuser.
pub fn can_manage(owner: Uuid, user: &AuthUser) -> bool {
    owner == user.id || user.is_superuser
}

pub fn ensure_can_manage(owner: Uuid, user: &AuthUser) -> AppResult<()> {
    if can_manage(owner, user) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

/// can_edit_course
///
/// Course editors may change lessons and topics: the owner, superusers and
/// co-authors who consented and are still active.
pub fn can_edit_course(course: &Course, co_author: Option<&AuthorDetails>, user: &AuthUser) -> bool {
    can_manage(course.created_by, user)
        || co_author.is_some_and(|author| author.user_id == user.id && author.grants_editing())
}

pub fn ensure_superuser(user: &AuthUser) -> AppResult<()> {
    if user.is_superuser {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_superuser: bool) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            username: "u".into(),
            is_superuser,
        }
    }

    fn course(owner: Uuid, published: bool) -> Course {
        Course {
            created_by: owner,
            is_published: published,
            is_active: true,
            ..Default::default()
        }
    }

    #[test]
    fn visibility_depends_on_viewer() {
        let owner = user(false);
        let stranger = user(false);
        let admin = user(true);
        let draft = course(owner.id, false);

        assert!(!Visibility::for_viewer(None).allows(&draft));
        assert!(!Visibility::for_viewer(Some(&stranger)).allows(&draft));
        assert!(Visibility::for_viewer(Some(&owner)).allows(&draft));
        assert!(Visibility::for_viewer(Some(&admin)).allows(&draft));
        assert!(Visibility::for_viewer(None).allows(&course(owner.id, true)));
    }

    #[test]
    fn owner_or_superuser_can_manage() {
        let owner = user(false);
        assert!(can_manage(owner.id, &owner));
        assert!(can_manage(owner.id, &user(true)));
        assert!(!can_manage(owner.id, &user(false)));
    }

    #[test]
    fn only_consented_active_co_authors_edit() {
        let owner = user(false);
        let co = user(false);
        let course = course(owner.id, true);
        let mut record = AuthorDetails {
            user_id: co.id,
            is_active: true,
            consent_given: false,
            ..Default::default()
        };

        assert!(!can_edit_course(&course, Some(&record), &co));
        record.consent_given = true;
        assert!(can_edit_course(&course, Some(&record), &co));
        record.is_active = false;
        assert!(!can_edit_course(&course, Some(&record), &co));
        assert!(can_edit_course(&course, None, &owner));
    }
}
