use std::sync::Arc;

use anyhow::{anyhow, Context};
use jiff::SignedDuration;
use serde_json::{json, Value};
use snaplink_accounts::{
    CreateRole, CreateUser, RoleService, UpdateRole, UpdateUser, UserService,
};
use snaplink_core::{
    LinkFilter, LinkRepository, PageLimits, RecordId, RedirectType, RoleFilter, RoleRepository,
    ShortCode, UserFilter, UserRepository,
};
use snaplink_generator::RandomGenerator;
use snaplink_redirector::RedirectorService;
use snaplink_shortener::{ExpirationPolicy, ShortenParams, ShortenerService, ShortenerSettings};

use crate::cli::{Command, Config};

/// Every service the CLI can drive, sharing one store.
pub struct App<S> {
    shortener: ShortenerService<S, RandomGenerator>,
    redirector: RedirectorService<S>,
    users: UserService<S>,
    roles: RoleService<S>,
    base_url: String,
}

impl<S> App<S>
where
    S: LinkRepository + UserRepository + RoleRepository,
{
    pub fn new(store: S, config: &Config) -> Self {
        let store = Arc::new(store);
        let page_limits = PageLimits::builder()
            .default_limit(config.default_page_size)
            .max_limit(config.max_page_size)
            .build();
        let settings = ShortenerSettings::builder()
            .max_attempts(config.max_allocation_attempts)
            .page_limits(page_limits)
            .build();
        let generator = RandomGenerator::builder()
            .entropy_bytes(usize::from(config.entropy_bytes))
            .build();

        Self {
            shortener: ShortenerService::from_shared(Arc::clone(&store), generator, settings),
            redirector: RedirectorService::from_shared(Arc::clone(&store)),
            users: UserService::from_shared(Arc::clone(&store), page_limits),
            roles: RoleService::from_shared(store, page_limits),
            base_url: config.base_url.clone(),
        }
    }

    /// Runs one command and returns its JSON rendering.
    pub async fn execute(&self, command: Command) -> anyhow::Result<Value> {
        let output = match command {
            Command::Migrate => json!({ "migrated": false }),
            Command::Shorten {
                url,
                alias,
                expires_in,
                expires_at,
                redirect_type,
            } => {
                let expiration = match (expires_in, expires_at) {
                    (Some(seconds), _) => {
                        ExpirationPolicy::AfterDuration(SignedDuration::from_secs(seconds))
                    }
                    (None, Some(at)) => ExpirationPolicy::AtTimestamp(at),
                    (None, None) => ExpirationPolicy::Never,
                };
                let mut params = ShortenParams::new(url)
                    .with_expiration(expiration)
                    .with_redirect_type(RedirectType::try_from(redirect_type).map_err(|e| anyhow!(e))?);
                if let Some(alias) = alias {
                    params = params.with_alias(ShortCode::new(alias)?);
                }

                let link = self.shortener.shorten(params).await?;
                json!({
                    "short_url": link.code.to_url(&self.base_url),
                    "link": link,
                })
            }
            Command::GetLink { code } => {
                let link = self.shortener.get(&ShortCode::new(code)?).await?;
                serde_json::to_value(link)?
            }
            Command::ListLinks { active, page } => {
                let filter = LinkFilter { is_active: active };
                let page = self
                    .shortener
                    .list(filter, page.cursor.as_deref(), page.limit)
                    .await?;
                serde_json::to_value(page)?
            }
            Command::Deactivate { code } => {
                let changed = self.shortener.deactivate(&ShortCode::new(code)?).await?;
                json!({ "deactivated": changed })
            }
            Command::Redeem { code } => {
                let redirection = self.redirector.redeem_str(&code).await?;
                json!({
                    "location": redirection.original_url,
                    "status": redirection.redirect_type.status_code(),
                })
            }
            Command::CreateRole {
                name,
                description,
                created_by,
            } => {
                let role = self
                    .roles
                    .create(CreateRole {
                        name,
                        description,
                        created_by,
                    })
                    .await?;
                serde_json::to_value(role)?
            }
            Command::ListRoles {
                include_deleted,
                active,
                page,
            } => {
                let filter = RoleFilter {
                    include_deleted,
                    is_active: active,
                };
                let page = self
                    .roles
                    .list(filter, page.cursor.as_deref(), page.limit)
                    .await?;
                serde_json::to_value(page)?
            }
            Command::UpdateRole {
                id,
                name,
                description,
                active,
                updated_by,
            } => {
                let role = self
                    .roles
                    .update(
                        RecordId::new(id),
                        UpdateRole {
                            name,
                            description,
                            is_active: active,
                            updated_by,
                        },
                    )
                    .await?;
                serde_json::to_value(role)?
            }
            Command::DeleteRole { id, deleted_by } => {
                self.roles.delete(RecordId::new(id), deleted_by).await?;
                json!({ "deleted": id })
            }
            Command::CreateUser {
                fullname,
                role_id,
                email,
                password_hash,
                created_by,
            } => {
                let user = self
                    .users
                    .create(CreateUser {
                        fullname,
                        role_id: RecordId::new(role_id),
                        email,
                        password_hash,
                        created_by,
                    })
                    .await?;
                serde_json::to_value(user)?
            }
            Command::GetUser {
                id,
                include_deleted,
            } => serde_json::to_value(self.users.get(RecordId::new(id), include_deleted).await?)?,
            Command::FindUser {
                email,
                include_deleted,
            } => serde_json::to_value(self.users.get_by_email(&email, include_deleted).await?)?,
            Command::ListUsers {
                role_id,
                include_deleted,
                active,
                page,
            } => {
                let filter = UserFilter {
                    include_deleted,
                    role_id: role_id.map(RecordId::new),
                    is_active: active,
                };
                let page = self
                    .users
                    .list(filter, page.cursor.as_deref(), page.limit)
                    .await
                    .context("listing users")?;
                serde_json::to_value(page)?
            }
            Command::UpdateUser {
                id,
                fullname,
                role_id,
                email,
                password_hash,
                active,
                updated_by,
            } => {
                let user = self
                    .users
                    .update(
                        RecordId::new(id),
                        UpdateUser {
                            fullname,
                            role_id: role_id.map(RecordId::new),
                            email,
                            password_hash,
                            is_active: active,
                            updated_by,
                        },
                    )
                    .await?;
                serde_json::to_value(user)?
            }
            Command::DeleteUser { id, deleted_by } => {
                self.users.delete(RecordId::new(id), deleted_by).await?;
                json!({ "deleted": id })
            }
        };

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use snaplink_storage::InMemoryStore;

    fn app() -> App<InMemoryStore> {
        let cli = Cli::try_parse_from(["snaplink", "migrate"]).unwrap();
        App::new(InMemoryStore::new(), &cli.config)
    }

    fn command(args: &[&str]) -> Command {
        let argv = std::iter::once("snaplink").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().command
    }

    #[tokio::test]
    async fn shorten_then_redeem() {
        let app = app();

        let created = app
            .execute(command(&["shorten", "https://example.com", "--alias", "docs", "--redirect-type", "302"]))
            .await
            .unwrap();
        assert_eq!(created["short_url"], "http://localhost:8080/docs");
        assert_eq!(created["link"]["redirect_type"], 302);

        let redeemed = app.execute(command(&["redeem", "docs"])).await.unwrap();
        assert_eq!(redeemed["location"], "https://example.com");
        assert_eq!(redeemed["status"], 302);

        let link = app.execute(command(&["get-link", "docs"])).await.unwrap();
        assert_eq!(link["clicks"], 1);
    }

    #[tokio::test]
    async fn listing_returns_page_info() {
        let app = app();
        for alias in ["one", "two", "three"] {
            app.execute(command(&["shorten", "https://example.com", "--alias", alias]))
                .await
                .unwrap();
        }

        let page = app
            .execute(command(&["list-links", "--limit", "2"]))
            .await
            .unwrap();
        assert_eq!(page["items"].as_array().unwrap().len(), 2);
        assert_eq!(page["page"]["has_next_page"], true);
        assert!(page["page"]["next_cursor"].is_string());
    }

    #[tokio::test]
    async fn users_never_expose_password_hash() {
        let app = app();
        let role = app
            .execute(command(&["create-role", "--name", "editor"]))
            .await
            .unwrap();
        let role_id = role["id"].as_u64().unwrap().to_string();

        let user = app
            .execute(command(&[
                "create-user",
                "--fullname",
                "Ada",
                "--role-id",
                &role_id,
                "--email",
                "Ada@Example.com",
                "--password-hash",
                "secret-hash",
            ]))
            .await
            .unwrap();
        assert_eq!(user["email"], "ada@example.com");
        assert!(user.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn update_user_changes_email() {
        let app = app();
        let role = app
            .execute(command(&["create-role", "--name", "editor"]))
            .await
            .unwrap();
        let role_id = role["id"].as_u64().unwrap().to_string();
        let user = app
            .execute(command(&[
                "create-user",
                "--fullname",
                "Ada",
                "--role-id",
                &role_id,
                "--email",
                "ada@example.com",
                "--password-hash",
                "secret-hash",
            ]))
            .await
            .unwrap();
        let user_id = user["id"].as_u64().unwrap().to_string();

        let updated = app
            .execute(command(&["update-user", &user_id, "--email", "Countess@Example.com"]))
            .await
            .unwrap();
        assert_eq!(updated["email"], "countess@example.com");
        assert_eq!(updated["fullname"], "Ada");

        let renamed = app
            .execute(command(&["update-role", &role_id, "--name", "writer"]))
            .await
            .unwrap();
        assert_eq!(renamed["name"], "writer");

        assert!(app
            .execute(command(&["update-user", "999", "--fullname", "Ghost"]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn redeeming_unknown_code_fails() {
        assert!(app().execute(command(&["redeem", "missing"])).await.is_err());
    }
}
