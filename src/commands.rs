pub const STLS_COMMAND: &str = "STLS";
pub const USER_COMMAND: &str = "USER";
pub const PASS_COMMAND: &str = "PASS";
pub const APOP_COMMAND: &str = "APOP";
pub const CAPA_COMMAND: &str = "CAPA";
pub const AUTH_COMMAND: &str = "AUTH";
pub const STAT_COMMAND: &str = "STAT";
pub const LIST_COMMAND: &str = "LIST";
pub const UIDL_COMMAND: &str = "UIDL";
pub const TOP_COMMAND: &str = "TOP";
pub const RETR_COMMAND: &str = "RETR";
pub const DELE_COMMAND: &str = "DELE";
pub const QUIT_COMMAND: &str = "QUIT";

pub const STLS_CAPABILITY: &str = "STLS";
pub const UIDL_CAPABILITY: &str = "UIDL";
pub const TOP_CAPABILITY: &str = "TOP";
pub const SASL_CAPABILITY: &str = "SASL";
pub const AUTH_PLAIN_CAPABILITY: &str = "PLAIN";
pub const AUTH_CRAM_MD5_CAPABILITY: &str = "CRAM-MD5";
pub const AUTH_EXTERNAL_CAPABILITY: &str = "EXTERNAL";
