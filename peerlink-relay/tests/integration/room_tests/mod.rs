mod test_full_room_rejects_join;
mod test_leave_disposes_room;
