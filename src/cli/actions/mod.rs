use crate::datasource::DatasourceConfig;

pub mod run;

#[derive(Debug)]
pub enum Action {
    Run {
        port: u16,
        listen: Option<String>,
        config: DatasourceConfig,
    },
}
