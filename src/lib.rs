pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod structs;
pub mod utils;

use std::sync::Arc;

use axum::middleware as axum_middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use hyper::http::Method;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};

use crate::middleware::logger_middleware::logger_middleware;
use crate::routes::comments::{
    comment_detail_route, comment_likes_route, comment_replies_route, create_comment_route,
    delete_comment_route, like_comment_route, own_comments_route, post_comments_route,
    report_comment_route, search_comments_route, update_comment_route,
};
use crate::routes::posts::{
    collect_post_route, create_post_route, delete_post_route, hot_posts_route, like_post_route,
    list_posts_route, post_detail_route, recommended_posts_route, report_post_route,
    update_post_route, view_history_route,
};
use crate::routes::tiebas::{
    apply_tieba_route, create_announcement_route, create_tieba_route, hot_tiebas_route,
    join_tieba_route, leave_tieba_route, list_categories_route, list_tiebas_route,
    recommended_tiebas_route, review_application_route, search_tiebas_route,
    tieba_announcements_route, tieba_applications_route, tieba_detail_route, tieba_members_route,
};
use crate::routes::users::{
    change_password_route, follow_user_route, get_profile_route, login_route, register_route,
    search_users_route, unfollow_user_route, update_profile_route, user_activities_route,
    user_detail_route, user_followers_route, user_following_route,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
}

pub fn app_router(pool: SqlitePool) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any);

    Router::new()
        .route("/register/", post(register_route))
        .route("/login/", post(login_route))
        .route("/profile/", get(get_profile_route).put(update_profile_route))
        .route("/profile/change-password/", post(change_password_route))
        .route("/profile/activities/", get(user_activities_route))
        .route("/users/search/", get(search_users_route))
        .route("/users/:id/", get(user_detail_route))
        .route("/users/:id/follow/", post(follow_user_route))
        .route("/users/:id/unfollow/", post(unfollow_user_route))
        .route("/users/:id/followers/", get(user_followers_route))
        .route("/users/:id/following/", get(user_following_route))
        .route("/categories/", get(list_categories_route))
        .route("/tiebas/", get(list_tiebas_route))
        .route("/tiebas/create/", post(create_tieba_route))
        .route("/tiebas/hot/", get(hot_tiebas_route))
        .route("/tiebas/recommended/", get(recommended_tiebas_route))
        .route("/tiebas/search/", get(search_tiebas_route))
        .route("/tiebas/:id/", get(tieba_detail_route))
        .route("/tiebas/:id/join/", post(join_tieba_route))
        .route("/tiebas/:id/leave/", post(leave_tieba_route))
        .route("/tiebas/:id/members/", get(tieba_members_route))
        .route("/tiebas/:id/announcements/", get(tieba_announcements_route))
        .route(
            "/tiebas/:id/announcements/create/",
            post(create_announcement_route),
        )
        .route("/tiebas/:id/apply/", post(apply_tieba_route))
        .route("/tiebas/:id/applications/", get(tieba_applications_route))
        .route(
            "/tiebas/:id/applications/:app_id/review/",
            post(review_application_route),
        )
        .route("/posts/", get(list_posts_route))
        .route("/posts/create/", post(create_post_route))
        .route("/posts/hot/", get(hot_posts_route))
        .route("/posts/recommended/", get(recommended_posts_route))
        .route("/posts/:id/", get(post_detail_route))
        .route("/posts/:id/update/", put(update_post_route))
        .route("/posts/:id/delete/", delete(delete_post_route))
        .route("/posts/:id/like/", post(like_post_route))
        .route("/posts/:id/collect/", post(collect_post_route))
        .route("/posts/:id/report/", post(report_post_route))
        .route("/posts/:id/comments/", get(post_comments_route))
        .route("/comments/create/", post(create_comment_route))
        .route("/comments/search/", get(search_comments_route))
        .route("/comments/:id/", get(comment_detail_route))
        .route("/comments/:id/update/", put(update_comment_route))
        .route("/comments/:id/delete/", delete(delete_comment_route))
        .route("/comments/:id/like/", post(like_comment_route))
        .route("/comments/:id/report/", post(report_comment_route))
        .route("/comments/:id/likes/", get(comment_likes_route))
        .route("/comments/:id/replies/", get(comment_replies_route))
        .route("/user/history/", get(view_history_route))
        .route("/user/comments/", get(own_comments_route))
        .layer(cors)
        .layer(axum_middleware::from_fn(logger_middleware))
        .with_state(Arc::new(AppState { pool }))
}
