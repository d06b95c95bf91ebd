pub mod cutting_list;
