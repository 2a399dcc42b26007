mod article_page_test;
