//! Skill repository manager scenarios

mod common;

use common::{greedy_context, repository, skill, unit};
use skillpath_core::prelude::*;
use uuid::Uuid;

#[tokio::test]
async fn test_identity_conflict() {
    let ctx = greedy_context().await;
    let manager = ctx.repository_manager();

    manager
        .create_repository(NewRepository::new("owner-1", "Rust").with_version("1.0"))
        .await
        .unwrap();

    let err = manager
        .create_repository(NewRepository::new("owner-1", "Rust").with_version("1.0"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RepositoryConflict { .. }));

    // Same name under another version or owner is fine
    manager
        .create_repository(NewRepository::new("owner-1", "Rust").with_version("2.0"))
        .await
        .unwrap();
    manager
        .create_repository(NewRepository::new("owner-2", "Rust").with_version("1.0"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unversioned_identity_conflict() {
    let ctx = greedy_context().await;
    let manager = ctx.repository_manager();

    manager
        .create_repository(NewRepository::new("owner-1", "Rust"))
        .await
        .unwrap();
    let err = manager
        .create_repository(NewRepository::new("owner-1", "Rust").with_version("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RepositoryConflict { version: None, .. }));
}

#[tokio::test]
async fn test_update_into_taken_identity() {
    let ctx = greedy_context().await;
    let manager = ctx.repository_manager();
    repository(&ctx, "Rust").await;
    let go = repository(&ctx, "Go").await;

    let err = manager
        .update_repository(
            go.id,
            RepositoryUpdate {
                name: Some("Rust".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RepositoryConflict { .. }));

    let renamed = manager
        .update_repository(
            go.id,
            RepositoryUpdate {
                version: Patch::Set("1.22".to_string()),
                description: Patch::Set("Concurrency first".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.version.as_deref(), Some("1.22"));
    assert_eq!(renamed.description.as_deref(), Some("Concurrency first"));
}

#[tokio::test]
async fn test_get_repository_includes_skills() {
    let ctx = greedy_context().await;
    let repo = repository(&ctx, "Rust").await;
    skill(&ctx, repo.id, "Traits").await;
    skill(&ctx, repo.id, "Closures").await;

    let detail = ctx.repository_manager().get_repository(repo.id).await.unwrap();
    let names: Vec<&str> = detail.skills.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Closures", "Traits"]);

    let err = ctx
        .repository_manager()
        .get_repository(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_repository_with_unreferenced_skills() {
    let ctx = greedy_context().await;
    let manager = ctx.repository_manager();
    let repo = repository(&ctx, "Rust").await;
    let child = skill(&ctx, repo.id, "Child").await;
    ctx.graph_store()
        .add_skill(NewSkill::new(repo.id, "Parent").nesting([child.id]))
        .await
        .unwrap();

    manager.delete_repository(repo.id).await.unwrap();

    assert!(manager.get_repository(repo.id).await.unwrap_err().is_not_found());
    assert!(ctx.graph_store().get_skill(child.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_repository_refused_when_unit_references_skill() {
    let ctx = greedy_context().await;
    let manager = ctx.repository_manager();
    let repo = repository(&ctx, "Rust").await;
    let taught = skill(&ctx, repo.id, "Macros").await;
    let free = skill(&ctx, repo.id, "Iterators").await;
    let u = unit(&ctx, "Macro workshop", &[], &[taught.id]).await;

    let err = manager.delete_repository(repo.id).await.unwrap_err();
    match err {
        Error::ReferencedEntity(blockers) => {
            assert_eq!(blockers.len(), 1);
            assert_eq!(blockers[0].skill_id, taught.id);
            assert_eq!(blockers[0].unit_ids, vec![u.id]);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Nothing was removed
    let detail = manager.get_repository(repo.id).await.unwrap();
    assert_eq!(detail.skills.len(), 2);
    assert!(detail.skills.iter().any(|s| s.id == free.id));
}

#[tokio::test]
async fn test_unfiltered_listing_is_paginated() {
    let ctx = greedy_context().await;
    let manager = ctx.repository_manager();
    for i in 0..12 {
        repository(&ctx, &format!("Repo {i:02}")).await;
    }

    let first = manager
        .list_repositories(&RepositoryFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(first.len(), 10);
    assert_eq!(first[0].name, "Repo 00");

    let second = manager
        .list_repositories(&RepositoryFilter::default(), Pagination::new(1, 10))
        .await
        .unwrap();
    let names: Vec<&str> = second.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Repo 10", "Repo 11"]);
}

#[tokio::test]
async fn test_filtered_listing_is_complete_without_page() {
    let ctx = greedy_context().await;
    let manager = ctx.repository_manager();
    for i in 0..12 {
        repository(&ctx, &format!("Repo {i:02}")).await;
    }
    manager
        .create_repository(NewRepository::new("owner-2", "Elsewhere"))
        .await
        .unwrap();

    let mine = manager
        .list_repositories(&RepositoryFilter::owner("owner-1"), Pagination::default())
        .await
        .unwrap();
    assert_eq!(mine.len(), 12);
    assert!(mine.iter().all(|r| r.owner_id == "owner-1"));

    let page = manager
        .list_repositories(&RepositoryFilter::owner("owner-1"), Pagination::new(0, 5))
        .await
        .unwrap();
    assert_eq!(page.len(), 5);
}
