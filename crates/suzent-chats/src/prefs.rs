//! User preferences and MCP server registry.
//!
//! Both live in the same database as the chats and are read at the start of
//! every turn to fill in config defaults the request did not supply.

use rusqlite::OptionalExtension;

use suzent_core::types::now_rfc3339;

use crate::error::{ChatStoreError, Result};
use crate::store::ChatStore;
use crate::types::{McpServer, UserPreferences};

impl ChatStore {
    /// Load a user's persisted defaults, or `None` when never saved.
    pub fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>> {
        self.with_conn(|db| {
            db.query_row(
                "SELECT model, agent, tools FROM user_preferences WHERE user_id = ?1",
                [user_id],
                |row| {
                    let tools_json: Option<String> = row.get(2)?;
                    Ok(UserPreferences {
                        model: row.get(0)?,
                        agent: row.get(1)?,
                        tools: tools_json
                            .and_then(|t| serde_json::from_str::<Vec<String>>(&t).ok()),
                    })
                },
            )
            .optional()
            .map_err(ChatStoreError::Database)
        })
    }

    /// Upsert a user's defaults.
    pub fn save_preferences(&self, user_id: &str, prefs: &UserPreferences) -> Result<()> {
        let tools_json = prefs
            .tools
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.with_conn(|db| {
            db.execute(
                "INSERT INTO user_preferences (user_id, model, agent, tools, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                   model = excluded.model, agent = excluded.agent,
                   tools = excluded.tools, updated_at = excluded.updated_at",
                rusqlite::params![user_id, prefs.model, prefs.agent, tools_json, now_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// All registered MCP servers, enabled or not.
    pub fn list_mcp_servers(&self) -> Result<Vec<McpServer>> {
        self.with_conn(|db| {
            let mut stmt = db.prepare(
                "SELECT name, transport, url, command, args, enabled
                 FROM mcp_servers ORDER BY name",
            )?;
            let rows = stmt.query_map([], |row| {
                let args_json: Option<String> = row.get(4)?;
                Ok(McpServer {
                    name: row.get(0)?,
                    transport: row.get(1)?,
                    url: row.get(2)?,
                    command: row.get(3)?,
                    args: args_json
                        .and_then(|a| serde_json::from_str(&a).ok())
                        .unwrap_or_default(),
                    enabled: row.get::<_, i64>(5)? != 0,
                })
            })?;
            Ok(rows.filter_map(|r| r.ok()).collect())
        })
    }

    /// Register or replace an MCP endpoint.
    pub fn save_mcp_server(&self, server: &McpServer) -> Result<()> {
        let args_json = serde_json::to_string(&server.args)?;
        self.with_conn(|db| {
            db.execute(
                "INSERT INTO mcp_servers (name, transport, url, command, args, enabled, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(name) DO UPDATE SET
                   transport = excluded.transport, url = excluded.url,
                   command = excluded.command, args = excluded.args,
                   enabled = excluded.enabled",
                rusqlite::params![
                    server.name,
                    server.transport,
                    server.url,
                    server.command,
                    args_json,
                    server.enabled as i64,
                    now_rfc3339()
                ],
            )?;
            Ok(())
        })
    }

    /// Flip a server's enabled flag. `NotFound` when unregistered.
    pub fn set_mcp_server_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.with_conn(|db| {
            let n = db.execute(
                "UPDATE mcp_servers SET enabled = ?1 WHERE name = ?2",
                rusqlite::params![enabled as i64, name],
            )?;
            if n == 0 {
                return Err(ChatStoreError::NotFound {
                    id: name.to_string(),
                });
            }
            Ok(())
        })
    }

    /// Remove an MCP endpoint.
    pub fn delete_mcp_server(&self, name: &str) -> Result<()> {
        self.with_conn(|db| {
            let n = db.execute("DELETE FROM mcp_servers WHERE name = ?1", [name])?;
            if n == 0 {
                return Err(ChatStoreError::NotFound {
                    id: name.to_string(),
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn store() -> ChatStore {
        ChatStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn preferences_round_trip() {
        let s = store();
        assert!(s.get_preferences("u1").unwrap().is_none());

        let prefs = UserPreferences {
            model: Some("gpt-4.1-mini".to_string()),
            agent: Some("code".to_string()),
            tools: Some(vec!["planning".to_string()]),
        };
        s.save_preferences("u1", &prefs).unwrap();

        let loaded = s.get_preferences("u1").unwrap().unwrap();
        assert_eq!(loaded.model.as_deref(), Some("gpt-4.1-mini"));
        assert_eq!(loaded.tools.unwrap(), vec!["planning"]);
    }

    #[test]
    fn mcp_server_enable_toggle() {
        let s = store();
        s.save_mcp_server(&McpServer {
            name: "docs".to_string(),
            transport: "http".to_string(),
            url: Some("http://localhost:9000/mcp".to_string()),
            command: None,
            args: vec![],
            enabled: false,
        })
        .unwrap();

        s.set_mcp_server_enabled("docs", true).unwrap();
        let servers = s.list_mcp_servers().unwrap();
        assert_eq!(servers.len(), 1);
        assert!(servers[0].enabled);

        assert!(matches!(
            s.set_mcp_server_enabled("nope", true).unwrap_err(),
            ChatStoreError::NotFound { .. }
        ));
    }
}
