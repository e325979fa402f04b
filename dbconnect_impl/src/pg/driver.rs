//! The PostgreSQL driver entry and its query rendering.

use crate::{
    base::QueryTemplate, ConnectParams, ConnectionConfiguration, DbResult, Driver, DriverInfo,
};

pub(crate) static POSTGRES_DRIVER_INFO: DriverInfo = DriverInfo {
    name: "postgresql",
    can_concur: true,
    can_pool: true,
    default_max_size: 8,
    default_max_idle_size: 8,
};

#[derive(Debug)]
pub(crate) struct PgDriver;

#[cfg_attr(feature = "async", async_trait::async_trait)]
impl Driver for PgDriver {
    fn info(&self) -> &DriverInfo {
        &POSTGRES_DRIVER_INFO
    }

    #[cfg(feature = "sync")]
    fn connect_sync(
        &self,
        params: &ConnectParams,
        config: &ConnectionConfiguration,
    ) -> DbResult<crate::sync::Connection> {
        crate::sync::Connection::with_configuration(params.clone(), config)
    }

    #[cfg(feature = "async")]
    async fn connect_async(
        &self,
        params: &ConnectParams,
        config: &ConnectionConfiguration,
    ) -> DbResult<crate::a_sync::Connection> {
        crate::a_sync::Connection::with_configuration(params.clone(), config).await
    }
}

/// The server-side name of the prepared statement for a request identity.
pub(crate) fn statement_name(id: u64) -> String {
    format!("_caq{id}")
}

/// Renders an expanded template into PostgreSQL syntax: 1-based `$n`
/// placeholders and `''`-escaped string literals.
pub(crate) fn render_query(template: &QueryTemplate) -> Result<String, String> {
    let mut out = String::new();
    render(template, &mut out)?;
    Ok(out)
}

fn render(template: &QueryTemplate, out: &mut String) -> Result<(), String> {
    match template {
        QueryTemplate::Lit(s) => out.push_str(s),
        QueryTemplate::Quote(s) => {
            out.push('\'');
            for c in s.chars() {
                if c == '\'' {
                    out.push_str("''");
                } else {
                    out.push(c);
                }
            }
            out.push('\'');
        }
        QueryTemplate::Param(i) => {
            out.push('$');
            out.push_str(&(i + 1).to_string());
        }
        QueryTemplate::Env(name) => {
            return Err(format!("unresolved environment reference \"{name}\""))
        }
        QueryTemplate::Seq(parts) => {
            for part in parts {
                render(part, out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{render_query, statement_name};
    use crate::base::QueryTemplate;

    #[test]
    fn renders_placeholders_one_based() {
        let t = QueryTemplate::with_question_marks("SELECT * FROM t WHERE a = ? AND b = ?");
        assert_eq!(
            render_query(&t).unwrap(),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[test]
    fn quotes_literals() {
        let t = QueryTemplate::Seq(vec![
            QueryTemplate::lit("SELECT "),
            QueryTemplate::quote("it's"),
        ]);
        assert_eq!(render_query(&t).unwrap(), "SELECT 'it''s'");
    }

    #[test]
    fn refuses_unresolved_env_references() {
        assert!(render_query(&QueryTemplate::env("schema")).is_err());
    }

    #[test]
    fn statement_names_carry_the_request_id() {
        assert_eq!(statement_name(17), "_caq17");
    }
}
