// Privacy Guard — Service Module
//
// The RPC surface served by the daemon. Method names are shared with the
// client so both sides agree on the wire.

mod privacy_info;

pub use privacy_info::PrivacyInfoService;

/// Interface name sent as the first frame of every request.
pub const INTERFACE_NAME: &str = "PrivacyInfoService";

/// Method names of the `PrivacyInfoService` interface.
pub mod method {
    pub const ADD_PRIVACY_ACCESS_LOG: &str = "PgAddPrivacyAccessLog";
    pub const ADD_PRIVACY_ACCESS_LOG_TEST: &str = "PgAddPrivacyAccessLogTest";
    pub const ADD_MONITOR_POLICY: &str = "PgAddMonitorPolicy";
    pub const DELETE_ALL_LOGS_AND_MONITOR_POLICY: &str = "PgDeleteAllLogsAndMonitorPolicy";
    pub const DELETE_LOGS_BY_PACKAGE_ID: &str = "PgDeleteLogsByPackageId";
    pub const DELETE_MONITOR_POLICY_BY_PACKAGE_ID: &str = "PgDeleteMonitorPolicyByPackageId";
    pub const FOREACH_TOTAL_PRIVACY_COUNT_OF_PACKAGE: &str = "PgForeachTotalPrivacyCountOfPackage";
    pub const FOREACH_TOTAL_PRIVACY_COUNT_OF_PRIVACY: &str = "PgForeachTotalPrivacyCountOfPrivacy";
    pub const FOREACH_PRIVACY_COUNT_BY_PRIVACY_ID: &str = "PgForeachPrivacyCountByPrivacyId";
    pub const FOREACH_PRIVACY_COUNT_BY_PACKAGE_ID: &str = "PgForeachPrivacyCountByPackageId";
    pub const FOREACH_PRIVACY_PACKAGE_ID: &str = "PgForeachPrivacyPackageId";
    pub const FOREACH_PACKAGE_BY_PRIVACY_ID: &str = "PgForeachPackageByPrivacyId";
    pub const FOREACH_MONITOR_POLICY_BY_PACKAGE_ID: &str = "PgForeachMonitorPolicyByPackageId";
    pub const GET_MONITOR_POLICY: &str = "PgGetMonitorPolicy";
    pub const GET_ALL_MONITOR_POLICY: &str = "PgGetAllMonitorPolicy";
    pub const CHECK_PRIVACY_PACKAGE: &str = "PgCheckPrivacyPackage";
    pub const UPDATE_MONITOR_POLICY: &str = "PgUpdateMonitorPolicy";
    pub const UPDATE_MAIN_MONITOR_POLICY: &str = "PgUpdateMainMonitorPolicy";
    pub const GET_MAIN_MONITOR_POLICY: &str = "PgGetMainMonitorPolicy";
    pub const DELETE_MAIN_MONITOR_POLICY_BY_USER_ID: &str = "PgDeleteMainMonitorPolicyByUserId";
}
