pub mod constants;
pub mod environment;
pub mod environment_project;
pub mod issue;
pub mod issue_event;
pub mod issue_hash;
pub mod issue_tag;
pub mod notification;
pub mod notification_issue;
pub mod organization;
pub mod project;
pub mod project_event_statistic;
pub mod project_transaction_statistic;
pub mod release;
pub mod release_project;
pub mod tag_key;
pub mod tag_value;
pub mod transaction_event;
pub mod transaction_group;
