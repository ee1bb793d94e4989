// complaintdesk schema - helpdesk tables for Diesel ORM

diesel::table! {
    users (id) {
        id -> Integer,
        username -> Text,
        role -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    categories (id) {
        id -> Integer,
        name -> Text,
        description -> Text,
        is_active -> Bool,
        created_at -> Text,
    }
}

diesel::table! {
    complaints (id) {
        id -> Integer,
        student_id -> Integer,           // FK to users, ON DELETE CASCADE
        assigned_staff_id -> Nullable<Integer>, // FK to users, ON DELETE SET NULL
        category_id -> Nullable<Integer>,       // FK to categories, ON DELETE SET NULL
        title -> Text,
        description -> Text,
        status -> Text,
        priority -> Text,
        solution -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
        resolved_at -> Nullable<Text>,
        sla_deadline -> Nullable<Text>,
        is_sla_breached -> Bool,
    }
}

diesel::table! {
    sla_configs (id) {
        id -> Integer,
        name -> Text,
        priority -> Text,
        response_time_hours -> Integer,
        resolution_time_hours -> Integer,
        is_active -> Bool,
        created_at -> Text,
        updated_at -> Text,
    }
}

// ============================================================================
// Tables owned by a complaint (cascade-deleted with it)
// ============================================================================

diesel::table! {
    escalations (id) {
        id -> Integer,
        complaint_id -> Integer,
        escalated_by_id -> Nullable<Integer>,
        escalated_to_id -> Nullable<Integer>,
        reason -> Text,
        notes -> Text,
        created_at -> Text,
        resolved -> Bool,
        resolved_at -> Nullable<Text>,
    }
}

diesel::table! {
    complaint_comments (id) {
        id -> Integer,
        complaint_id -> Integer,
        author_id -> Nullable<Integer>,
        content -> Text,
        is_internal -> Bool,
        created_at -> Text,
    }
}

diesel::joinable!(complaints -> categories (category_id));
diesel::joinable!(escalations -> complaints (complaint_id));
diesel::joinable!(complaint_comments -> complaints (complaint_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    categories,
    complaints,
    sla_configs,
    escalations,
    complaint_comments,
);
