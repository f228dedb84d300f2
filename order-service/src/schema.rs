diesel::table! {
    orders (order_id) {
        order_id -> Int4,
        ticket_id -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    tickets (ticket_id) {
        ticket_id -> Int4,
        ticket_name -> Varchar,
        total_quantity -> Int4,
        current_quantity -> Int4,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    orders,
    tickets,
);
