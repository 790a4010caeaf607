//! User administration

use crate::authorization::{Role, RoleSet};
use crate::context::AppContext;
use crate::error::AgoraError;
use crate::middleware::ClientCtx;
use crate::user::{list_users, set_roles, user_detail};
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(users_overview)
        .service(view_user)
        .service(update_user_roles);
}

#[derive(Deserialize)]
pub struct UserSearch {
    pub q: Option<String>,
}

#[get("/admin/users")]
pub async fn users_overview(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    query: web::Query<UserSearch>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let users = list_users(&ctx.db, actor, query.q.as_deref()).await?;
    Ok(HttpResponse::Ok().json(json!({ "users": users, "search": query.q.as_deref().unwrap_or("") })))
}

#[get("/admin/users/{user_id}")]
pub async fn view_user(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let user = user_detail(&ctx.db, actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[derive(Deserialize)]
pub struct RolesForm {
    pub roles: Vec<String>,
}

impl RolesForm {
    fn role_set(&self) -> Result<RoleSet, AgoraError> {
        let mut set = RoleSet::new();
        let mut unknown = Vec::new();
        for name in &self.roles {
            match Role::parse(name) {
                Some(role) => {
                    set.insert(role);
                }
                None => unknown.push(format!("roles: unknown role '{}'", name)),
            }
        }
        if unknown.is_empty() {
            Ok(set)
        } else {
            Err(AgoraError::Validation(unknown))
        }
    }
}

#[post("/admin/users/{user_id}/roles")]
pub async fn update_user_roles(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
    form: web::Json<RolesForm>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let requested = form.role_set()?;
    let user_id = path.into_inner();

    let roles = set_roles(&ctx.db, actor, user_id, requested).await?;
    Ok(HttpResponse::Ok().json(json!({ "user_id": user_id, "roles": roles.names() })))
}
